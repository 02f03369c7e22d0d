//! # Parameter Context
//!
//! Raw parameter values as they arrive from the parameter-collection layer,
//! and the read-only context a single evaluation runs against.
//!
//! Values are either numbers or strings; strings that look like numbers
//! (`"10"`, `" 0.3 "`) resolve to their numeric value when a formula uses them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A raw, untyped parameter value.
///
/// Deserializes from a JSON number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

/// Parameter name to raw value. Ordered so snapshots serialize deterministically.
pub type Parameters = BTreeMap<String, ParameterValue>;

impl ParameterValue {
    /// Numeric reading of the value, if it has one.
    ///
    /// Text is trimmed and parsed as a float; non-finite parses are rejected.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParameterValue::Number(v) => Some(*v),
            ParameterValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// The value as text, exactly as it would be echoed in an error message
    pub fn as_text(&self) -> String {
        match self {
            ParameterValue::Number(v) => v.to_string(),
            ParameterValue::Text(s) => s.clone(),
        }
    }

    /// Borrow the string when the value is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) => Some(s),
            ParameterValue::Number(_) => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Number(v) => write!(f, "{}", v),
            ParameterValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Number(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Number(f64::from(v))
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::Text(s.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        ParameterValue::Text(s)
    }
}

/// Build a [`Parameters`] map from `(name, value)` pairs.
///
/// ```rust
/// use takeoff_core::context::{parameters, ParameterValue};
///
/// let params = parameters([("length", ParameterValue::from(10.0)), ("finish", "fair faced".into())]);
/// assert_eq!(params["length"], ParameterValue::Number(10.0));
/// ```
pub fn parameters<I, K>(pairs: I) -> Parameters
where
    I: IntoIterator<Item = (K, ParameterValue)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Read-only bindings for one evaluation.
///
/// Built fresh for every calculation from the element's parameters plus the
/// derived `element_type` and `material` fields. Functions and constants are
/// not part of the context; they come from the
/// [`FunctionRegistry`](crate::functions::FunctionRegistry).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterContext {
    parameters: Parameters,
    element_type: Option<String>,
    material: Option<String>,
}

impl ParameterContext {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            element_type: None,
            material: None,
        }
    }

    /// Attach the derived element fields
    pub fn with_element_metadata(mut self, element_type: Option<String>, material: Option<String>) -> Self {
        self.element_type = element_type;
        self.material = material;
        self
    }

    /// Look up a binding. Supplied parameters shadow the derived fields.
    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        if let Some(value) = self.parameters.get(name) {
            return Some(value.clone());
        }
        match name {
            "element_type" => self.element_type.clone().map(ParameterValue::Text),
            "material" => self.material.clone().map(ParameterValue::Text),
            _ => None,
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn element_type(&self) -> Option<&str> {
        self.element_type.as_deref()
    }

    pub fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }
}
