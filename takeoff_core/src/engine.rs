//! # Calculation Engine
//!
//! Turns an element plus an assembly into a persisted [`Quantity`]:
//!
//! 1. element, assembly and formula must be present
//! 2. every required parameter must be supplied (all gaps reported together)
//! 3. declared parameters must have the right type, bounds and rule (first failure wins)
//! 4. the formula is evaluated against the element's parameters
//! 5. the result must be finite; negative values carry a warning
//! 6. the raw value is converted from the assembly's formula unit to its unit
//! 7. the quantity is stored
//! 8. one audit record is written, whatever happened above; a quantity
//!    whose record cannot be written is withdrawn from the store
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::assembly::Assembly;
//! use takeoff_core::audit::{Actor, AuditRecorder};
//! use takeoff_core::config::EngineConfig;
//! use takeoff_core::element::Element;
//! use takeoff_core::engine::CalculationEngine;
//! use takeoff_core::units::Unit;
//!
//! let engine = CalculationEngine::in_memory(EngineConfig::default());
//! let element = Element::new("Footing F1")
//!     .with_parameter("length", 10.0)
//!     .with_parameter("width", 2.0)
//!     .with_parameter("height", 0.3);
//! let assembly = Assembly::new("1.1", "Mass concrete", "length * width * height", Unit::CubicMetre);
//!
//! let quantity = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap();
//! assert!((quantity.value - 6.0).abs() < 1e-12);
//! assert_eq!(engine.audit().records().unwrap().len(), 1);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::assembly::{Assembly, AssemblyCatalog};
use crate::audit::{Actor, AuditLog, AuditOutcome, AuditRecord, AuditRecorder};
use crate::config::EngineConfig;
use crate::element::Element;
use crate::errors::{CalcError, CalcResult};
use crate::formula::{EvalLimits, Formula};
use crate::functions::FunctionRegistry;
use crate::quantity::{CalculationResult, CalculationWarning, Quantity};
use crate::store::{InMemoryQuantityStore, QuantityStore};
use crate::trace::{CalculationStep, StepKind};
use crate::units;

// ============================================================================
// Batch report
// ============================================================================

/// An assembly that failed during bulk recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub assembly_id: Uuid,
    pub assembly_code: String,
    pub error: CalcError,
}

/// Outcome of [`CalculationEngine::recalculate_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub element_id: Uuid,
    /// Quantities now stored for the element (empty when cancelled)
    pub created: Vec<Quantity>,
    pub failures: Vec<BatchFailure>,
    /// True when a shutdown request stopped the batch; nothing was replaced
    pub cancelled: bool,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Timing of one attempt, from its start to its audit record.
struct Attempt {
    started_at: DateTime<Utc>,
    timer: Instant,
}

/// Orchestrates validation, evaluation, persistence and audit.
///
/// Holds no per-calculation state; the store and recorder are the only
/// shared collaborators and synchronize internally.
pub struct CalculationEngine {
    config: EngineConfig,
    limits: EvalLimits,
    registry: &'static FunctionRegistry,
    audit: Arc<dyn AuditRecorder>,
    store: Arc<dyn QuantityStore>,
}

impl std::fmt::Debug for CalculationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculationEngine")
            .field("engine_version", &self.config.engine_version)
            .field("limits", &self.limits)
            .finish()
    }
}

impl CalculationEngine {
    pub fn new(config: EngineConfig, audit: Arc<dyn AuditRecorder>, store: Arc<dyn QuantityStore>) -> Self {
        let limits = config.limits();
        Self {
            config,
            limits,
            registry: FunctionRegistry::standard(),
            audit,
            store,
        }
    }

    /// Engine backed by an in-memory audit log and quantity store
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(AuditLog::new()), Arc::new(InMemoryQuantityStore::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<dyn AuditRecorder> {
        &self.audit
    }

    pub fn store(&self) -> &Arc<dyn QuantityStore> {
        &self.store
    }

    /// Calculate and store one quantity.
    ///
    /// Either input may be absent; that is reported as a parameter error
    /// and audited like any other failure. The error is returned unchanged
    /// after the failure record is written.
    ///
    /// A stored quantity always has a success record: when the audit write
    /// fails the quantity is removed again and the audit error is returned.
    pub fn calculate(
        &self,
        element: Option<&Element>,
        assembly: Option<&Assembly>,
        actor: &Actor,
    ) -> CalcResult<Quantity> {
        let (attempt, outcome) = self.evaluate(element, assembly);
        let outcome = outcome.and_then(|quantity| {
            self.store.insert(quantity.clone())?;
            Ok(quantity)
        });
        self.settle(&attempt, element, assembly, actor, outcome)
    }

    /// Recalculate every assembly attached to the element's classification
    /// and replace its quantities with the successful results.
    pub fn recalculate_all(
        &self,
        element: &Element,
        catalog: &dyn AssemblyCatalog,
        actor: &Actor,
    ) -> CalcResult<BatchReport> {
        self.recalculate_all_with_shutdown(element, catalog, actor, &AtomicBool::new(false))
    }

    /// [`recalculate_all`](Self::recalculate_all), checking `shutdown` before each assembly.
    ///
    /// Every assembly is evaluated first, then the element's quantities are
    /// replaced in one store call, then each attempt is audited with its
    /// final outcome. When shutdown is requested the batch stops, the
    /// element's stored quantities are left untouched and the report is
    /// marked cancelled; attempts made before the stop are audited as
    /// failures since nothing was stored for them.
    pub fn recalculate_all_with_shutdown(
        &self,
        element: &Element,
        catalog: &dyn AssemblyCatalog,
        actor: &Actor,
        shutdown: &AtomicBool,
    ) -> CalcResult<BatchReport> {
        let classification = element
            .classification
            .as_deref()
            .ok_or_else(|| CalcError::missing_input("classification"))?;

        let span = info_span!("recalculate", element = %element.id, classification);
        let _guard = span.enter();

        let assemblies = catalog.assemblies_for(classification);
        info!(count = assemblies.len(), "recalculating assemblies");

        let mut evaluated = Vec::with_capacity(assemblies.len());
        for assembly in &assemblies {
            if shutdown.load(Ordering::SeqCst) {
                warn!(
                    completed = evaluated.len(),
                    remaining = assemblies.len() - evaluated.len(),
                    "shutdown requested, leaving quantities unchanged"
                );
                let cancelled = CalcError::internal("recalculation cancelled before quantities were replaced");
                let failures = self.settle_batch(element, actor, evaluated, Some(&cancelled)).1;
                return Ok(BatchReport {
                    element_id: element.id,
                    created: Vec::new(),
                    failures,
                    cancelled: true,
                });
            }
            let (attempt, outcome) = self.evaluate(Some(element), Some(assembly));
            evaluated.push((assembly, attempt, outcome));
        }

        let successes: Vec<Quantity> = evaluated
            .iter()
            .filter_map(|(_, _, outcome)| outcome.as_ref().ok().cloned())
            .collect();
        let replaced = self.store.replace_for_element(&element.id, successes);
        if let Err(e) = &replaced {
            error!(error = %e, "failed to replace quantities");
        }

        let (created, failures) = self.settle_batch(element, actor, evaluated, replaced.as_ref().err());
        replaced?;
        info!(created = created.len(), failed = failures.len(), "recalculation finished");

        Ok(BatchReport {
            element_id: element.id,
            created,
            failures,
            cancelled: false,
        })
    }

    /// Audit each evaluated batch attempt. `not_stored` turns every success
    /// into that failure, for batches whose results never reached the store.
    fn settle_batch(
        &self,
        element: &Element,
        actor: &Actor,
        evaluated: Vec<(&Assembly, Attempt, CalcResult<Quantity>)>,
        not_stored: Option<&CalcError>,
    ) -> (Vec<Quantity>, Vec<BatchFailure>) {
        let mut created = Vec::new();
        let mut failures = Vec::new();
        for (assembly, attempt, outcome) in evaluated {
            let outcome = match (not_stored, outcome) {
                (Some(e), Ok(_)) => Err(e.clone()),
                (_, outcome) => outcome,
            };
            match self.settle(&attempt, Some(element), Some(assembly), actor, outcome) {
                Ok(quantity) => created.push(quantity),
                Err(error) => failures.push(BatchFailure {
                    assembly_id: assembly.id,
                    assembly_code: assembly.code.clone(),
                    error,
                }),
            }
        }
        (created, failures)
    }

    /// Steps 1 to 6 inside a `calculate` span, with the attempt's timing.
    fn evaluate(&self, element: Option<&Element>, assembly: Option<&Assembly>) -> (Attempt, CalcResult<Quantity>) {
        let attempt = Attempt {
            started_at: Utc::now(),
            timer: Instant::now(),
        };

        let span = info_span!(
            "calculate",
            element = ?element.map(|e| e.id),
            assembly = assembly.map(|a| a.code.as_str()).unwrap_or("-")
        );
        let _guard = span.enter();

        let outcome = self
            .run(element, assembly)
            .map(|(element, assembly, result)| Quantity::new(element.id, assembly.id, result));
        (attempt, outcome)
    }

    /// Step 8: write the audit record for a finished attempt.
    ///
    /// If the write fails, a successful quantity is withdrawn from the store
    /// and the audit error replaces the success. Failures keep their own error.
    fn settle(
        &self,
        attempt: &Attempt,
        element: Option<&Element>,
        assembly: Option<&Assembly>,
        actor: &Actor,
        outcome: CalcResult<Quantity>,
    ) -> CalcResult<Quantity> {
        let (audit_outcome, steps) = match &outcome {
            Ok(quantity) => {
                info!(value = quantity.value, unit = %quantity.unit, "calculation succeeded");
                (
                    AuditOutcome::Success {
                        quantity_id: quantity.id,
                        raw_result: quantity.result.raw_result,
                        value: quantity.value,
                        unit: quantity.unit,
                    },
                    quantity.result.calculation_steps.clone(),
                )
            }
            Err(e) => {
                error!(error_kind = %e.kind(), code = e.error_code(), error = %e, "calculation failed");
                (AuditOutcome::failure(e), Vec::new())
            }
        };

        let record = AuditRecord {
            sequence: 0,
            element_id: element.map(|e| e.id),
            assembly_id: assembly.map(|a| a.id),
            assembly_code: assembly.map(|a| a.code.clone()),
            formula: assembly.map(|a| a.formula.clone()),
            parameters: element.map(|e| e.parameters.clone()).unwrap_or_default(),
            steps,
            outcome: audit_outcome,
            actor: actor.clone(),
            started_at: attempt.started_at,
            duration_us: u64::try_from(attempt.timer.elapsed().as_micros()).unwrap_or(u64::MAX),
            engine_version: self.config.engine_version.clone(),
        };

        let audit_error = match self.audit.record(record) {
            Ok(id) => {
                debug!(audit_id = %id, "audit record written");
                return outcome;
            }
            Err(e) => e,
        };
        error!(error = %audit_error, "failed to write audit record");

        let quantity = outcome?;
        match self.store.remove(&quantity.element_id, &quantity.id) {
            Ok(_) => warn!(quantity = %quantity.id, "unaudited quantity withdrawn"),
            Err(e) => error!(error = %e, quantity = %quantity.id, "failed to withdraw unaudited quantity"),
        }
        Err(audit_error)
    }

    /// Steps 1 to 6: everything short of persistence.
    fn run<'a>(
        &self,
        element: Option<&'a Element>,
        assembly: Option<&'a Assembly>,
    ) -> CalcResult<(&'a Element, &'a Assembly, CalculationResult)> {
        let element = element.ok_or_else(|| CalcError::missing_input("element"))?;
        let assembly = assembly.ok_or_else(|| CalcError::missing_input("assembly"))?;
        if assembly.formula.trim().is_empty() {
            return Err(CalcError::missing_input("formula"));
        }

        let schema = &assembly.parameter_schema;
        schema.check_required(&element.parameters)?;
        schema.check_values(&element.parameters)?;

        let formula = Formula::parse_with(&assembly.formula, self.registry, &self.limits)?;
        let evaluation = formula.evaluate(&element.context(), self.registry, &self.limits)?;
        let raw = evaluation.value;
        let mut steps = evaluation.steps;
        debug!(steps = steps.len(), raw, "formula evaluated");

        if !raw.is_finite() {
            return Err(CalcError::calculation(format!(
                "formula '{}' produced a non-finite result ({})",
                assembly.formula, raw
            )));
        }

        let mut warnings = Vec::new();
        if raw < 0.0 {
            warn!(value = raw, "negative result");
            warnings.push(CalculationWarning::NegativeResult { value: raw });
        }

        let from = assembly.source_unit();
        let to = assembly.unit;
        steps.push(CalculationStep::new(StepKind::Result, formula.source(), raw).with_unit(from));

        let standardized = units::convert(raw, from, to)?;
        if !standardized.is_finite() {
            return Err(CalcError::calculation(format!(
                "converting {} {} to {} overflowed",
                raw, from, to
            )));
        }
        let mut conversion = CalculationStep::new(StepKind::UnitConversion, format!("{} {} -> {}", raw, from, to), standardized)
            .with_unit(to);
        if from == to {
            conversion = conversion.with_detail("identity");
        }
        steps.push(conversion);

        let result = CalculationResult {
            raw_result: raw,
            standardized_result: standardized,
            unit: to,
            calculation_steps: steps,
            formula_used: assembly.formula.clone(),
            parameters_used: element.parameters.clone(),
            warnings,
            engine_version: self.config.engine_version.clone(),
            calculated_at: Utc::now(),
        };
        Ok((element, assembly, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Catalog;
    use crate::audit::{AuditRecordId, AuditStatus};
    use crate::schema::{ParameterSchema, ParameterSpec};
    use crate::units::Unit;

    fn engine() -> CalculationEngine {
        CalculationEngine::in_memory(EngineConfig {
            engine_version: "test-1".into(),
            ..EngineConfig::default()
        })
    }

    fn slab() -> Assembly {
        Assembly::new("S1", "Slab", "length * width * thickness", Unit::CubicMetre)
            .with_classification("slab")
            .with_schema(
                ParameterSchema::new()
                    .with(ParameterSpec::number("length"))
                    .with(ParameterSpec::number("width"))
                    .with(ParameterSpec::number("thickness"))
                    .require(["length", "width", "thickness"]),
            )
    }

    fn slab_element() -> Element {
        Element::new("GF slab")
            .with_classification("slab")
            .with_parameter("length", 10.0)
            .with_parameter("width", 5.0)
            .with_parameter("thickness", 0.2)
    }

    #[test]
    fn test_trace_ends_with_result_and_conversion() {
        let engine = engine();
        let q = engine.calculate(Some(&slab_element()), Some(&slab()), &Actor::System).unwrap();
        let kinds: Vec<_> = q.result.calculation_steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Substitution,
                StepKind::Substitution,
                StepKind::Substitution,
                StepKind::Result,
                StepKind::UnitConversion
            ]
        );
        assert_eq!(q.result.engine_version, "test-1");
        assert_eq!(q.result.parameters_used.len(), 3);
    }

    #[test]
    fn test_missing_inputs_are_audited() {
        let engine = engine();
        let err = engine.calculate(None, Some(&slab()), &Actor::System).unwrap_err();
        assert_eq!(err, CalcError::missing_input("element"));

        let blank = Assembly::new("X", "Blank", "   ", Unit::Number);
        let err = engine.calculate(Some(&slab_element()), Some(&blank), &Actor::System).unwrap_err();
        assert_eq!(err, CalcError::missing_input("formula"));

        let records = engine.audit().records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status() == AuditStatus::Failure));
        assert_eq!(records[1].formula.as_deref(), Some("   "));
        assert!(engine.store().all().unwrap().is_empty());
    }

    #[test]
    fn test_non_finite_result() {
        let engine = engine();
        let assembly = Assembly::new("X", "Huge", "pow(10, 400)", Unit::Number);
        let err = engine
            .calculate(Some(&Element::new("e")), Some(&assembly), &Actor::System)
            .unwrap_err();
        assert_eq!(err.error_code(), "CALCULATION_ERROR");
    }

    #[test]
    fn test_incompatible_formula_unit() {
        let engine = engine();
        let assembly = Assembly::new("X", "Bad units", "length", Unit::CubicMetre).with_formula_unit(Unit::Metre);
        let element = Element::new("e").with_parameter("length", 3.0);
        let err = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap_err();
        assert_eq!(err.error_code(), "UNIT_ERROR");
    }

    /// Rejects every record whose assembly code is in `codes`.
    struct RejectingRecorder {
        inner: AuditLog,
        codes: Vec<&'static str>,
    }

    impl RejectingRecorder {
        fn new(codes: &[&'static str]) -> Self {
            Self {
                inner: AuditLog::new(),
                codes: codes.to_vec(),
            }
        }

        fn all() -> Self {
            Self::new(&[])
        }
    }

    impl AuditRecorder for RejectingRecorder {
        fn record(&self, record: AuditRecord) -> CalcResult<AuditRecordId> {
            let rejected = match record.assembly_code.as_deref() {
                Some(code) => self.codes.is_empty() || self.codes.contains(&code),
                None => self.codes.is_empty(),
            };
            if rejected {
                return Err(CalcError::internal("disk full"));
            }
            self.inner.record(record)
        }

        fn records(&self) -> CalcResult<Vec<AuditRecord>> {
            self.inner.records()
        }
    }

    /// A store whose bulk replace always fails.
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: InMemoryQuantityStore,
    }

    impl QuantityStore for ReadOnlyStore {
        fn insert(&self, quantity: Quantity) -> CalcResult<()> {
            self.inner.insert(quantity)
        }
        fn replace_for_element(&self, _element_id: &Uuid, _quantities: Vec<Quantity>) -> CalcResult<()> {
            Err(CalcError::file_error("replace", "quantities", "read-only"))
        }
        fn remove(&self, element_id: &Uuid, quantity_id: &Uuid) -> CalcResult<Option<Quantity>> {
            self.inner.remove(element_id, quantity_id)
        }
        fn delete_for_element(&self, element_id: &Uuid) -> CalcResult<usize> {
            self.inner.delete_for_element(element_id)
        }
        fn for_element(&self, element_id: &Uuid) -> CalcResult<Vec<Quantity>> {
            self.inner.for_element(element_id)
        }
        fn all(&self) -> CalcResult<Vec<Quantity>> {
            self.inner.all()
        }
    }

    #[test]
    fn test_unaudited_quantity_is_withdrawn() {
        let store = Arc::new(InMemoryQuantityStore::new());
        let engine = CalculationEngine::new(EngineConfig::default(), Arc::new(RejectingRecorder::all()), store.clone());
        let element = Element::new("e").with_parameter("length", 3.0);
        let assembly = Assembly::new("L", "Length", "length", Unit::Metre);

        let err = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap_err();

        assert_eq!(err, CalcError::internal("disk full"));
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_failed_audit_keeps_calculation_error() {
        let engine = CalculationEngine::new(
            EngineConfig::default(),
            Arc::new(RejectingRecorder::all()),
            Arc::new(InMemoryQuantityStore::new()),
        );
        let assembly = Assembly::new("X", "Broken", "length +", Unit::Metre);
        let err = engine
            .calculate(Some(&Element::new("e")), Some(&assembly), &Actor::System)
            .unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_ERROR");
    }

    #[test]
    fn test_batch_audit_failure_counts_for_that_assembly() {
        let recorder = Arc::new(RejectingRecorder::new(&["S2"]));
        let store = Arc::new(InMemoryQuantityStore::new());
        let engine = CalculationEngine::new(EngineConfig::default(), recorder.clone(), store.clone());
        let element = slab_element();
        let catalog: Catalog = vec![
            slab(),
            Assembly::new("S2", "Slab area", "length * width", Unit::SquareMetre).with_classification("slab"),
        ]
        .into_iter()
        .collect();

        let report = engine.recalculate_all(&element, &catalog, &Actor::System).unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].assembly_code, "S2");
        assert_eq!(report.failures[0].error, CalcError::internal("disk full"));
        let stored = store.for_element(&element.id).unwrap();
        assert_eq!(stored, report.created);
        let records = recorder.records().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_success());
    }

    #[test]
    fn test_failed_replace_audits_no_stored_ids() {
        let store = Arc::new(ReadOnlyStore::default());
        let audit = Arc::new(AuditLog::new());
        let engine = CalculationEngine::new(EngineConfig::default(), audit.clone(), store.clone());
        let element = slab_element();
        let catalog: Catalog = vec![slab()].into_iter().collect();

        let err = engine.recalculate_all(&element, &catalog, &Actor::System).unwrap_err();

        assert_eq!(err.error_code(), "FILE_ERROR");
        assert!(store.all().unwrap().is_empty());
        let records = audit.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), AuditStatus::Failure);
        assert_eq!(records[0].error(), Some(&err));
    }

    #[test]
    fn test_recalculate_requires_classification() {
        let engine = engine();
        let catalog: Catalog = vec![slab()].into_iter().collect();
        let err = engine
            .recalculate_all(&Element::new("unclassified"), &catalog, &Actor::System)
            .unwrap_err();
        assert_eq!(err, CalcError::missing_input("classification"));
    }

    #[test]
    fn test_shutdown_leaves_quantities_untouched() {
        let engine = engine();
        let element = slab_element();
        let catalog: Catalog = vec![slab()].into_iter().collect();
        engine.recalculate_all(&element, &catalog, &Actor::System).unwrap();
        let before = engine.store().for_element(&element.id).unwrap();

        let report = engine
            .recalculate_all_with_shutdown(&element, &catalog, &Actor::System, &AtomicBool::new(true))
            .unwrap();
        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert_eq!(engine.store().for_element(&element.id).unwrap(), before);
    }
}
