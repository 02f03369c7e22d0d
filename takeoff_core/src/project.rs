//! # Project Data Structures
//!
//! The `Project` struct bundles everything the command-line tools work on.
//! Projects serialize to `.tko` (Takeoff) files as human-readable JSON.
//!
//! ## Structure
//!
//! ```text
//! Project
//! ├── meta: ProjectMetadata (version, estimator, job info, timestamps)
//! ├── settings: ProjectSettings (classification system, default actor)
//! ├── catalog: Catalog (assemblies)
//! ├── elements: HashMap<Uuid, Element>
//! ├── quantities: Vec<Quantity>
//! └── audit_log: Vec<AuditRecord>
//! ```
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::element::Element;
//! use takeoff_core::project::Project;
//!
//! let mut project = Project::new("Jane Estimator", "25-042", "ACME Corp");
//! let id = project.add_element(Element::new("Wall W1").with_classification("wall"));
//! assert!(project.get_element(&id).is_some());
//!
//! let json = serde_json::to_string_pretty(&project).unwrap();
//! assert!(json.contains("Wall W1"));
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembly::{Assembly, Catalog};
use crate::audit::AuditRecord;
use crate::element::Element;
use crate::quantity::Quantity;

/// Current schema version for .tko files
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Root project container.
///
/// Elements are stored in a flat UUID-keyed map; quantities and audit
/// records refer to them by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub meta: ProjectMetadata,

    #[serde(default)]
    pub settings: ProjectSettings,

    #[serde(default)]
    pub catalog: Catalog,

    #[serde(default)]
    pub elements: HashMap<Uuid, Element>,

    #[serde(default)]
    pub quantities: Vec<Quantity>,

    /// Append-only; written back after every engine run
    #[serde(default)]
    pub audit_log: Vec<AuditRecord>,
}

impl Project {
    /// Create a new empty project.
    ///
    /// # Example
    ///
    /// ```rust
    /// use takeoff_core::project::Project;
    ///
    /// let project = Project::new("John Doe", "25-001", "Client Corp");
    /// assert_eq!(project.meta.estimator, "John Doe");
    /// ```
    pub fn new(estimator: impl Into<String>, job_id: impl Into<String>, client: impl Into<String>) -> Self {
        let now = Utc::now();
        Project {
            meta: ProjectMetadata {
                version: SCHEMA_VERSION.to_string(),
                estimator: estimator.into(),
                job_id: job_id.into(),
                client: client.into(),
                created: now,
                modified: now,
            },
            settings: ProjectSettings::default(),
            catalog: Catalog::new(),
            elements: HashMap::new(),
            quantities: Vec::new(),
            audit_log: Vec::new(),
        }
    }

    /// Add an element, returning its id.
    pub fn add_element(&mut self, element: Element) -> Uuid {
        let id = element.id;
        self.elements.insert(id, element);
        self.touch();
        id
    }

    /// Remove an element together with its quantities and audit records.
    pub fn remove_element(&mut self, id: &Uuid) -> Option<Element> {
        let element = self.elements.remove(id)?;
        self.quantities.retain(|q| &q.element_id != id);
        self.audit_log.retain(|r| r.element_id.as_ref() != Some(id));
        self.touch();
        Some(element)
    }

    pub fn get_element(&self, id: &Uuid) -> Option<&Element> {
        self.elements.get(id)
    }

    /// Find an element by exact name
    pub fn element_by_name(&self, name: &str) -> Option<&Element> {
        self.elements.values().find(|e| e.name == name)
    }

    /// Add an assembly to the catalog, returning its id.
    pub fn add_assembly(&mut self, assembly: Assembly) -> Uuid {
        let id = self.catalog.insert(assembly);
        self.touch();
        id
    }

    pub fn quantities_for(&self, element_id: &Uuid) -> Vec<&Quantity> {
        self.quantities.iter().filter(|q| &q.element_id == element_id).collect()
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.meta.modified = Utc::now();
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

impl Default for Project {
    fn default() -> Self {
        Project::new("", "", "")
    }
}

/// Project metadata stored in the file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Schema version (for migration compatibility)
    pub version: String,

    /// Name of the responsible estimator
    pub estimator: String,

    /// Job/project number
    pub job_id: String,

    pub client: String,

    pub created: DateTime<Utc>,

    pub modified: DateTime<Utc>,
}

/// Project-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Classification system the catalog codes refer to (e.g., "NRM2")
    pub classification_system: String,

    /// Actor recorded when the CLI is not told who is calculating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_actor: Option<String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        ProjectSettings {
            classification_system: "NRM2".to_string(),
            default_actor: None,
        }
    }
}
