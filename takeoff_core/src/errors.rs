//! # Error Types
//!
//! Structured error types for takeoff_core. Every failure the engine can
//! produce is a variant of [`CalcError`]; [`CalcError::kind`] groups them into
//! the calculation taxonomy (parameter, formula, unit, calculation) plus a
//! storage bucket for file and serialization problems.
//!
//! Errors serialize to JSON so they can be embedded in audit records and
//! handed to downstream tooling unchanged.
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::errors::{CalcError, CalcResult, ErrorKind};
//!
//! fn require_formula(formula: &str) -> CalcResult<()> {
//!     if formula.trim().is_empty() {
//!         return Err(CalcError::missing_input("formula"));
//!     }
//!     Ok(())
//! }
//!
//! let err = require_formula("  ").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Parameter);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for takeoff_core operations
pub type CalcResult<T> = Result<T, CalcError>;

/// Coarse classification of a [`CalcError`].
///
/// The first four kinds are the calculation taxonomy; `Storage` covers
/// project files and serialization, which never originate inside a
/// calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parameter,
    Formula,
    Unit,
    Calculation,
    Storage,
}

impl ErrorKind {
    /// Display name used in audit output
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorKind::Parameter => "ParameterError",
            ErrorKind::Formula => "FormulaError",
            ErrorKind::Unit => "UnitError",
            ErrorKind::Calculation => "CalculationError",
            ErrorKind::Storage => "StorageError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Structured error type for calculation operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling programmatic error handling by callers and audit tooling.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum CalcError {
    /// A required input to the engine itself (element, assembly, formula) is absent
    #[error("Missing required input: {field}")]
    MissingInput { field: String },

    /// One or more required parameters were not supplied
    #[error("Missing required parameters: {}", missing.join(", "))]
    MissingParameters { missing: Vec<String> },

    /// A supplied parameter failed its declared type, bounds or rule
    #[error("Invalid parameter '{parameter}': {value} - {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// The formula could not be parsed or evaluated
    #[error("Formula error in '{expression}': {reason}")]
    Formula { expression: String, reason: String },

    /// No conversion path between two units
    #[error("Unit error: cannot convert '{from}' to '{to}' - {reason}")]
    Unit {
        from: String,
        to: String,
        reason: String,
    },

    /// Evaluation produced a value that is not a usable quantity
    #[error("Calculation failed: {reason}")]
    Calculation { reason: String },

    /// File I/O error
    #[error("File error: {operation} on '{path}' - {reason}")]
    FileError {
        operation: String,
        path: String,
        reason: String,
    },

    /// File is locked by another user/process
    #[error("File locked: '{path}' is locked by {locked_by} since {locked_at}")]
    FileLocked {
        path: String,
        locked_by: String,
        locked_at: String,
    },

    /// JSON/TOML serialization or deserialization error
    #[error("Serialization error: {reason}")]
    SerializationError { reason: String },

    /// Schema version mismatch
    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: String,
        expected_version: String,
    },

    /// Generic internal error (should be rare)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CalcError {
    /// Create a MissingInput error
    pub fn missing_input(field: impl Into<String>) -> Self {
        CalcError::MissingInput {
            field: field.into(),
        }
    }

    /// Create a MissingParameters error
    pub fn missing_parameters<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CalcError::MissingParameters {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an InvalidParameter error
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CalcError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a Formula error
    pub fn formula(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::Formula {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Create a Unit error
    pub fn unit(from: impl Into<String>, to: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::Unit {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create a Calculation error
    pub fn calculation(reason: impl Into<String>) -> Self {
        CalcError::Calculation {
            reason: reason.into(),
        }
    }

    /// Create a FileError
    pub fn file_error(operation: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::FileError {
            operation: operation.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a FileLocked error
    pub fn file_locked(path: impl Into<String>, locked_by: impl Into<String>, locked_at: impl Into<String>) -> Self {
        CalcError::FileLocked {
            path: path.into(),
            locked_by: locked_by.into(),
            locked_at: locked_at.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization(reason: impl Into<String>) -> Self {
        CalcError::SerializationError {
            reason: reason.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        CalcError::Internal {
            message: message.into(),
        }
    }

    /// Which branch of the taxonomy this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalcError::MissingInput { .. }
            | CalcError::MissingParameters { .. }
            | CalcError::InvalidParameter { .. } => ErrorKind::Parameter,
            CalcError::Formula { .. } => ErrorKind::Formula,
            CalcError::Unit { .. } => ErrorKind::Unit,
            CalcError::Calculation { .. } => ErrorKind::Calculation,
            CalcError::FileError { .. }
            | CalcError::FileLocked { .. }
            | CalcError::SerializationError { .. }
            | CalcError::VersionMismatch { .. }
            | CalcError::Internal { .. } => ErrorKind::Storage,
        }
    }

    /// Check if this is a recoverable error (e.g., can retry)
    ///
    /// Calculation failures are deterministic, so only lock contention qualifies.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CalcError::FileLocked { .. })
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CalcError::MissingInput { .. } => "MISSING_INPUT",
            CalcError::MissingParameters { .. } => "MISSING_PARAMETERS",
            CalcError::InvalidParameter { .. } => "INVALID_PARAMETER",
            CalcError::Formula { .. } => "FORMULA_ERROR",
            CalcError::Unit { .. } => "UNIT_ERROR",
            CalcError::Calculation { .. } => "CALCULATION_ERROR",
            CalcError::FileError { .. } => "FILE_ERROR",
            CalcError::FileLocked { .. } => "FILE_LOCKED",
            CalcError::SerializationError { .. } => "SERIALIZATION_ERROR",
            CalcError::VersionMismatch { .. } => "VERSION_MISMATCH",
            CalcError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for CalcError {
    fn from(e: serde_json::Error) -> Self {
        CalcError::serialization(e.to_string())
    }
}
