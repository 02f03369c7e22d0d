//! Building elements.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::{ParameterContext, ParameterValue, Parameters};

/// A building element that quantities are calculated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: Uuid,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,

    /// Classification code used to pick assemblies from the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,

    /// Raw parameter values, as collected
    #[serde(default)]
    pub parameters: Parameters,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            id: Uuid::new_v4(),
            name: name.into(),
            element_type: None,
            material: None,
            classification: None,
            parameters: Parameters::new(),
        }
    }

    pub fn with_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Fresh evaluation context over a copy of this element's parameters
    pub fn context(&self) -> ParameterContext {
        ParameterContext::new(self.parameters.clone())
            .with_element_metadata(self.element_type.clone(), self.material.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_carries_metadata() {
        let element = Element::new("GF slab")
            .with_type("slab")
            .with_material("C30 concrete")
            .with_parameter("length", 10.0)
            .with_parameter("finish", "power floated");
        let ctx = element.context();
        assert_eq!(ctx.get("length"), Some(ParameterValue::from(10.0)));
        assert_eq!(ctx.get("element_type"), Some(ParameterValue::from("slab")));
        assert_eq!(ctx.material(), Some("C30 concrete"));
    }

    #[test]
    fn test_element_json() {
        let json = r#"{
            "id": "7f1d4c1e-8a53-4c3b-9a0e-0c6d1f7a2b11",
            "name": "Wall W1",
            "classification": "wall",
            "parameters": {"length": 4.5, "height": "2.4"}
        }"#;
        let element: Element = serde_json::from_str(json).unwrap();
        assert_eq!(element.parameters.len(), 2);
        assert_eq!(element.parameters["height"].as_number(), Some(2.4));
        assert!(element.material.is_none());
    }
}
