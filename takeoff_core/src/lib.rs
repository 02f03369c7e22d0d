//! # takeoff_core - Quantity Calculation Engine
//!
//! `takeoff_core` computes quantities (areas, volumes, lengths, counts) for
//! building elements by evaluating assembly formulas against element
//! parameters. Every result carries the full step-by-step trace that
//! produced it, and every attempt, successful or not, is written to an
//! append-only audit trail.
//!
//! ## Design Philosophy
//!
//! - **Closed language**: formulas are arithmetic plus a fixed function whitelist
//! - **Screened input**: dangerous or malformed formulas are rejected before parsing
//! - **Traceable**: results hold every substitution and function application
//! - **JSON-First**: all types implement Serialize/Deserialize
//! - **Rich Errors**: structured error types, not just strings
//!
//! ## Quick Start
//!
//! ```rust
//! use takeoff_core::prelude::*;
//!
//! let engine = CalculationEngine::in_memory(EngineConfig::default());
//! let wall = Element::new("Wall W1")
//!     .with_parameter("length", 4.5)
//!     .with_parameter("height", 2.4);
//! let blockwork = Assembly::new("14.1", "Blockwork", "length * height", Unit::SquareMetre);
//!
//! let quantity = engine.calculate(Some(&wall), Some(&blockwork), &Actor::System).unwrap();
//! assert!((quantity.value - 10.8).abs() < 1e-9);
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - Validation, evaluation, persistence and audit in one call
//! - [`formula`] - Formula screening, parsing and evaluation
//! - [`functions`] - Whitelisted functions and constants
//! - [`units`] - Unit conversion
//! - [`schema`] - Parameter declarations and validation
//! - [`audit`] - Audit records and recorders
//! - [`project`] / [`file_io`] - Project files with atomic saves and locking
//! - [`errors`] - Structured error types

pub mod assembly;
pub mod audit;
pub mod config;
pub mod context;
pub mod element;
pub mod engine;
pub mod errors;
pub mod file_io;
pub mod formula;
pub mod functions;
pub mod project;
pub mod quantity;
pub mod schema;
pub mod store;
pub mod trace;
pub mod units;

// Re-export commonly used types at crate root for convenience
pub use errors::{CalcError, CalcResult, ErrorKind};
pub use file_io::{load_project, save_project, FileLock};
pub use project::{Project, ProjectMetadata, ProjectSettings};

/// Everything needed to set up an engine and run calculations.
pub mod prelude {
    pub use crate::assembly::{Assembly, AssemblyCatalog, Catalog};
    pub use crate::audit::{Actor, AuditLog, AuditRecord, AuditRecorder};
    pub use crate::config::EngineConfig;
    pub use crate::context::{parameters, ParameterContext, ParameterValue, Parameters};
    pub use crate::element::Element;
    pub use crate::engine::{BatchReport, CalculationEngine};
    pub use crate::errors::{CalcError, CalcResult, ErrorKind};
    pub use crate::quantity::{CalculationResult, Quantity};
    pub use crate::schema::{ParameterRule, ParameterSchema, ParameterSpec};
    pub use crate::store::{InMemoryQuantityStore, QuantityStore};
    pub use crate::units::Unit;
}
