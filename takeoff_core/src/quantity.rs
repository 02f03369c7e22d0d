//! # Calculation Results and Quantities
//!
//! [`CalculationResult`] is everything one successful engine run produced:
//! the raw and standardized values, the full step trace, and a snapshot of
//! the inputs. A [`Quantity`] is the persisted outcome for an
//! element/assembly pair and embeds its result. Quantities are never edited;
//! recalculation replaces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Parameters;
use crate::trace::CalculationStep;
use crate::units::Unit;

/// Non-blocking observations about a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalculationWarning {
    /// The formula produced a value below zero
    NegativeResult { value: f64 },
}

impl std::fmt::Display for CalculationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalculationWarning::NegativeResult { value } => {
                write!(f, "Result is negative ({}); check the input dimensions", value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// Formula output before unit standardization
    pub raw_result: f64,

    /// Value in the assembly's unit
    pub standardized_result: f64,

    pub unit: Unit,

    pub calculation_steps: Vec<CalculationStep>,

    pub formula_used: String,

    /// Parameters exactly as they were evaluated
    pub parameters_used: Parameters,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CalculationWarning>,

    pub engine_version: String,

    pub calculated_at: DateTime<Utc>,
}

/// Persisted quantity for one element and assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub id: Uuid,
    pub element_id: Uuid,
    pub assembly_id: Uuid,
    pub value: f64,
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CalculationWarning>,
    pub result: CalculationResult,
}

impl Quantity {
    pub fn new(element_id: Uuid, assembly_id: Uuid, result: CalculationResult) -> Self {
        Quantity {
            id: Uuid::new_v4(),
            element_id,
            assembly_id,
            value: result.standardized_result,
            unit: result.unit,
            warnings: result.warnings.clone(),
            result,
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
