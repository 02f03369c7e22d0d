//! Step-by-step calculation trace.
//!
//! Every substitution, constant lookup and function application the evaluator
//! performs becomes one [`CalculationStep`], in evaluation order. The engine
//! appends unit standardization and the final result. Steps hold no
//! timestamps, so the same formula and parameters always produce the same
//! trace.

use serde::{Deserialize, Serialize};

use crate::units::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// A parameter was replaced by its value
    Substitution,
    /// A named constant was replaced by its value
    Constant,
    /// A whitelisted function was applied
    FunctionCall,
    /// The raw result was converted to the assembly's unit
    UnitConversion,
    /// Final value of the formula
    Result,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationStep {
    pub kind: StepKind,
    /// Sub-expression as it appears in the formula, e.g. `sqrt(area)`
    pub expression: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    /// Extra context, such as how a unit argument was resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CalculationStep {
    pub fn new(kind: StepKind, expression: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            expression: expression.into(),
            value,
            unit: None,
            detail: None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for CalculationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.expression, self.value)?;
        if let Some(unit) = self.unit {
            write!(f, " {}", unit)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let step = CalculationStep::new(StepKind::FunctionCall, "to_m(length, length_unit)", 1.2)
            .with_unit(Unit::Metre)
            .with_detail("length_unit = mm");
        assert_eq!(step.to_string(), "to_m(length, length_unit) = 1.2 m (length_unit = mm)");
        assert_eq!(CalculationStep::new(StepKind::Substitution, "length", 10.0).to_string(), "length = 10");
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&CalculationStep::new(StepKind::Constant, "PI", 3.0)).unwrap();
        assert_eq!(json, r#"{"kind":"constant","expression":"PI","value":3.0}"#);
    }
}
