//! # Engine Configuration
//!
//! Loaded once at startup and handed to the [`CalculationEngine`](crate::engine::CalculationEngine).
//! The engine never reads configuration or environment variables on its own.
//!
//! ```toml
//! engine_version = "0.1.0"
//! default_actor = "user:estimator"
//! max_formula_length = 2000
//! max_trace_steps = 10000
//! log_format = "pretty"
//! ```
//!
//! Environment overrides, applied after the file:
//!
//! - `TAKEOFF_ENGINE_VERSION`
//! - `TAKEOFF_MAX_FORMULA_LENGTH`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audit::Actor;
use crate::errors::{CalcError, CalcResult};
use crate::formula::EvalLimits;

pub const ENV_ENGINE_VERSION: &str = "TAKEOFF_ENGINE_VERSION";
pub const ENV_MAX_FORMULA_LENGTH: &str = "TAKEOFF_MAX_FORMULA_LENGTH";

/// Upper bound accepted for `max_formula_length`, in bytes
pub const FORMULA_LENGTH_CAP: usize = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stamped on every result and audit record
    pub engine_version: String,

    /// Actor used when a caller does not name one (`system`, `user:<id>`, `ai:<model>`)
    pub default_actor: String,

    pub max_formula_length: usize,

    pub max_trace_steps: usize,

    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = EvalLimits::default();
        EngineConfig {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            default_actor: "system".to_string(),
            max_formula_length: limits.max_formula_length,
            max_trace_steps: limits.max_trace_steps,
            log_format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `path` (defaults when `None` or missing), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> CalcResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file without looking at the environment.
    pub fn load_from(path: &Path) -> CalcResult<Self> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CalcError::file_error("read config", path.display().to_string(), e.to_string()))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CalcError::serialization(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CalcResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(version) = lookup(ENV_ENGINE_VERSION) {
            self.engine_version = version;
        }
        if let Some(raw) = lookup(ENV_MAX_FORMULA_LENGTH) {
            self.max_formula_length = raw.trim().parse().map_err(|_| {
                CalcError::internal(format!("{} must be a whole number, got '{}'", ENV_MAX_FORMULA_LENGTH, raw))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> CalcResult<()> {
        if self.engine_version.trim().is_empty() {
            return Err(CalcError::internal("invalid configuration: engine_version is empty"));
        }
        if self.max_formula_length == 0 || self.max_formula_length > FORMULA_LENGTH_CAP {
            return Err(CalcError::internal(format!(
                "invalid configuration: max_formula_length must be between 1 and {}",
                FORMULA_LENGTH_CAP
            )));
        }
        if self.max_trace_steps == 0 {
            return Err(CalcError::internal("invalid configuration: max_trace_steps must be > 0"));
        }
        self.actor()?;
        Ok(())
    }

    pub fn actor(&self) -> CalcResult<Actor> {
        self.default_actor.parse()
    }

    pub fn limits(&self) -> EvalLimits {
        EvalLimits {
            max_formula_length: self.max_formula_length,
            max_trace_steps: self.max_trace_steps,
        }
    }

    /// Default config as TOML, for `takeoff init`
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
