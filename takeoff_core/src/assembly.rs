//! # Assemblies and the Assembly Catalog
//!
//! An [`Assembly`] is a named calculation template: a formula, the unit its
//! result is reported in, and the schema of the parameters it needs.
//! Assemblies live in a catalog and are matched to elements by
//! classification code.
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::assembly::{Assembly, AssemblyCatalog, Catalog};
//! use takeoff_core::schema::{ParameterSchema, ParameterSpec};
//! use takeoff_core::units::Unit;
//!
//! let slab = Assembly::new("2.5.1", "Ground slab", "length * width * thickness", Unit::CubicMetre)
//!     .with_classification("Ss_20_05")
//!     .with_schema(
//!         ParameterSchema::new()
//!             .with(ParameterSpec::number("length"))
//!             .with(ParameterSpec::number("width"))
//!             .with(ParameterSpec::number("thickness"))
//!             .require(["length", "width", "thickness"]),
//!     );
//!
//! let mut catalog = Catalog::new();
//! catalog.insert(slab);
//! assert_eq!(catalog.assemblies_for("Ss_20_05").len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ParameterSchema;
use crate::units::Unit;

/// Calculation template from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: Uuid,

    /// Catalog reference, e.g. an NRM item code
    pub code: String,

    pub name: String,

    /// Formula text in the takeoff formula grammar
    pub formula: String,

    /// Unit the quantity is reported in
    pub unit: Unit,

    /// Unit the raw formula output is expressed in, when it differs from `unit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_unit: Option<Unit>,

    #[serde(default)]
    pub parameter_schema: ParameterSchema,

    /// Element classification this assembly applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
}

impl Assembly {
    pub fn new(code: impl Into<String>, name: impl Into<String>, formula: impl Into<String>, unit: Unit) -> Self {
        Assembly {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            formula: formula.into(),
            unit,
            formula_unit: None,
            parameter_schema: ParameterSchema::default(),
            classification: None,
        }
    }

    pub fn with_formula_unit(mut self, unit: Unit) -> Self {
        self.formula_unit = Some(unit);
        self
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = Some(classification.into());
        self
    }

    /// Unit of the raw formula output: `formula_unit`, falling back to `unit`
    pub fn source_unit(&self) -> Unit {
        self.formula_unit.unwrap_or(self.unit)
    }

    pub fn applies_to(&self, classification: &str) -> bool {
        self.classification.as_deref() == Some(classification)
    }
}

/// Source of assemblies for bulk recalculation.
pub trait AssemblyCatalog: Send + Sync {
    /// Every assembly attached to `classification`, in catalog order
    fn assemblies_for(&self, classification: &str) -> Vec<Assembly>;

    fn get(&self, id: &Uuid) -> Option<Assembly>;

    fn by_code(&self, code: &str) -> Option<Assembly>;
}

/// In-memory catalog. Serializes as a plain list of assemblies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    assemblies: Vec<Assembly>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assembly, replacing any existing one with the same id.
    pub fn insert(&mut self, assembly: Assembly) -> Uuid {
        let id = assembly.id;
        match self.assemblies.iter_mut().find(|a| a.id == id) {
            Some(existing) => *existing = assembly,
            None => self.assemblies.push(assembly),
        }
        id
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Assembly> {
        let index = self.assemblies.iter().position(|a| &a.id == id)?;
        Some(self.assemblies.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assembly> {
        self.assemblies.iter()
    }

    pub fn len(&self) -> usize {
        self.assemblies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }
}

impl AssemblyCatalog for Catalog {
    fn assemblies_for(&self, classification: &str) -> Vec<Assembly> {
        self.assemblies
            .iter()
            .filter(|a| a.applies_to(classification))
            .cloned()
            .collect()
    }

    fn get(&self, id: &Uuid) -> Option<Assembly> {
        self.assemblies.iter().find(|a| &a.id == id).cloned()
    }

    fn by_code(&self, code: &str) -> Option<Assembly> {
        self.assemblies.iter().find(|a| a.code == code).cloned()
    }
}

impl FromIterator<Assembly> for Catalog {
    fn from_iter<T: IntoIterator<Item = Assembly>>(iter: T) -> Self {
        let mut catalog = Catalog::new();
        for assembly in iter {
            catalog.insert(assembly);
        }
        catalog
    }
}
