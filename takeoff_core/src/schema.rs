//! # Parameter Schema
//!
//! Each assembly declares the parameters its formula needs: a name, a type,
//! optional numeric bounds, an optional named rule, and which names are
//! required. The engine validates an element's raw parameters against the
//! schema in two passes:
//!
//! 1. [`ParameterSchema::check_required`] collects *every* missing name and
//!    reports them together, in schema order.
//! 2. [`ParameterSchema::check_values`] stops at the first declared parameter
//!    whose value has the wrong type, falls outside its bounds, or breaks its
//!    rule.
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::context::{parameters, ParameterValue};
//! use takeoff_core::schema::{ParameterSchema, ParameterSpec, ParameterRule};
//!
//! let schema = ParameterSchema::new()
//!     .with(ParameterSpec::number("length").rule(ParameterRule::PositiveNumber))
//!     .with(ParameterSpec::number("width"))
//!     .require(["length", "width"]);
//!
//! let params = parameters([("length", ParameterValue::from(10.0))]);
//! let err = schema.check_required(&params).unwrap_err();
//! assert_eq!(err.to_string(), "Missing required parameters: width");
//! ```

use serde::{Deserialize, Serialize};

use crate::context::{ParameterValue, Parameters};
use crate::errors::{CalcError, CalcResult};
use crate::units::{Unit, UnitFamily};

// ============================================================================
// Declared types and rules
// ============================================================================

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Any value that parses as a float
    Number,
    /// A whole number; floats with a zero fraction are accepted
    Integer,
    /// Any string or number
    String,
}

impl ParameterType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ParameterType::Number => "number",
            ParameterType::Integer => "integer",
            ParameterType::String => "string",
        }
    }
}

/// Named validation rule applied after the type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRule {
    /// Strictly greater than zero
    PositiveNumber,
    /// Zero or greater
    NonNegativeNumber,
    /// Two or three positive sizes joined by `x`, e.g. `1200x600` or `2.4 x 1.2 m`
    DimensionFormat,
}

// ============================================================================
// Specs
// ============================================================================

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParameterType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ParameterRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Unit the value is expected in (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        ParameterSpec {
            name: name.into(),
            param_type,
            minimum: None,
            maximum: None,
            rule: None,
            description: None,
            unit: None,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Number)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Integer)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn rule(mut self, rule: ParameterRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Type check, then bounds, then rule. Returns the first violation.
    pub fn check(&self, value: &ParameterValue) -> CalcResult<()> {
        let invalid = |reason: String| CalcError::invalid_parameter(&self.name, value.as_text(), reason);

        let number = match self.param_type {
            ParameterType::Number => Some(
                value
                    .as_number()
                    .ok_or_else(|| invalid("expected a number".to_string()))?,
            ),
            ParameterType::Integer => {
                let n = value
                    .as_number()
                    .ok_or_else(|| invalid("expected an integer".to_string()))?;
                if n.fract() != 0.0 {
                    return Err(invalid("expected an integer".to_string()));
                }
                Some(n)
            }
            ParameterType::String => value.as_number(),
        };

        if let Some(n) = number {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(invalid(format!("must be at least {}", min)));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(invalid(format!("must be at most {}", max)));
                }
            }
        }

        match self.rule {
            None => Ok(()),
            Some(ParameterRule::PositiveNumber) => match number {
                Some(n) if n > 0.0 => Ok(()),
                _ => Err(invalid("must be a positive number".to_string())),
            },
            Some(ParameterRule::NonNegativeNumber) => match number {
                Some(n) if n >= 0.0 => Ok(()),
                _ => Err(invalid("must be zero or a positive number".to_string())),
            },
            Some(ParameterRule::DimensionFormat) => match value.as_str().and_then(parse_dimensions) {
                Some(_) => Ok(()),
                None => Err(invalid(
                    "expected dimensions such as 1200x600 or 2.4x1.2x0.3 m".to_string(),
                )),
            },
        }
    }
}

/// Sizes parsed from a dimension string.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimensions {
    pub sizes: Vec<f64>,
    pub unit: Option<Unit>,
}

/// Parse `AxB` or `AxBxC`, optionally followed by a length unit.
///
/// Whitespace is ignored and `x`/`X`/`×` all separate sizes. Every size must
/// be a positive number.
pub fn parse_dimensions(text: &str) -> Option<Dimensions> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '×' { 'x' } else { c.to_ascii_lowercase() })
        .collect();

    let parts: Vec<&str> = compact.split('x').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let (last, rest) = parts.split_last()?;
    let split = last
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(last.len());
    let (last_number, suffix) = last.split_at(split);

    let unit = if suffix.is_empty() {
        None
    } else {
        let unit: Unit = suffix.parse().ok()?;
        if unit.family() != UnitFamily::Length {
            return None;
        }
        Some(unit)
    };

    let sizes = rest
        .iter()
        .copied()
        .chain(std::iter::once(last_number))
        .map(|part| part.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0))
        .collect::<Option<Vec<_>>>()?;

    Some(Dimensions { sizes, unit })
}

// ============================================================================
// Schema
// ============================================================================

/// Ordered parameter declarations plus the names that must be supplied.
///
/// Required names need not appear in `properties`; an undeclared required
/// name is only checked for presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(default)]
    pub properties: Vec<ParameterSpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration, replacing any earlier one with the same name
    pub fn with(mut self, spec: ParameterSpec) -> Self {
        self.properties.retain(|p| p.name != spec.name);
        self.properties.push(spec);
        self
    }

    /// Mark names as required, keeping first-seen order
    pub fn require<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.required.contains(&name) {
                self.required.push(name);
            }
        }
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Required names absent from `params`, in schema order
    pub fn missing(&self, params: &Parameters) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| !params.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Fails with every missing required name at once.
    pub fn check_required(&self, params: &Parameters) -> CalcResult<()> {
        let missing = self.missing(params);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CalcError::missing_parameters(missing))
        }
    }

    /// Checks each declared parameter that is present, stopping at the first violation.
    pub fn check_values(&self, params: &Parameters) -> CalcResult<()> {
        for spec in &self.properties {
            if let Some(value) = params.get(&spec.name) {
                spec.check(value)?;
            }
        }
        Ok(())
    }

    /// Both passes, required names first
    pub fn validate(&self, params: &Parameters) -> CalcResult<()> {
        self.check_required(params)?;
        self.check_values(params)
    }
}
