//! End-to-end behaviour of the calculation engine through its public API.

use std::sync::Arc;

use takeoff_core::audit::AuditStatus;
use takeoff_core::formula::lexer::DENYLIST;
use takeoff_core::prelude::*;
use takeoff_core::quantity::CalculationWarning;
use takeoff_core::trace::StepKind;

fn engine() -> (CalculationEngine, Arc<AuditLog>, Arc<InMemoryQuantityStore>) {
    let audit = Arc::new(AuditLog::new());
    let store = Arc::new(InMemoryQuantityStore::new());
    let engine = CalculationEngine::new(EngineConfig::default(), audit.clone(), store.clone());
    (engine, audit, store)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn wall() -> Element {
    Element::new("W1")
        .with_classification("wall")
        .with_parameter("length", 10.0)
        .with_parameter("width", 2.0)
        .with_parameter("height", 0.3)
}

fn area_schema() -> ParameterSchema {
    ParameterSchema::new()
        .with(ParameterSpec::number("length"))
        .with(ParameterSpec::number("width"))
        .with(ParameterSpec::number("height"))
        .require(["length", "width", "height"])
}

#[test]
fn test_same_inputs_same_result() {
    let (engine, _, _) = engine();
    let element = wall();
    let assembly = Assembly::new("A", "Volume", "length * width * height", Unit::CubicMetre);

    let first = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap();
    let second = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap();

    assert_eq!(first.value, second.value);
    assert_eq!(first.result.calculation_steps, second.result.calculation_steps);
    assert_ne!(first.id, second.id);
}

#[test]
fn test_arithmetic_volume() {
    let (engine, _, _) = engine();
    let assembly = Assembly::new("A", "Volume", "length * width * height", Unit::CubicMetre);

    let quantity = engine.calculate(Some(&wall()), Some(&assembly), &Actor::System).unwrap();

    assert!(approx(quantity.value, 6.0));
    assert_eq!(quantity.unit, Unit::CubicMetre);
    assert!(!quantity.has_warnings());
}

#[test]
fn test_missing_parameters_are_all_reported() {
    let (engine, audit, _) = engine();
    let element = Element::new("W2").with_parameter("length", 10.0);
    let assembly = Assembly::new("A", "Volume", "length * width * height", Unit::CubicMetre).with_schema(area_schema());

    let err = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap_err();

    assert_eq!(
        err,
        CalcError::MissingParameters {
            missing: vec!["width".to_string(), "height".to_string()]
        }
    );
    assert_eq!(audit.count(), 1);
}

#[test]
fn test_text_rejected_for_number_parameter() {
    let (engine, _, store) = engine();
    let element = wall().with_parameter("width", "abc");
    let assembly = Assembly::new("A", "Volume", "length * width * height", Unit::CubicMetre).with_schema(area_schema());

    let err = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap_err();

    assert_eq!(err.error_code(), "INVALID_PARAMETER");
    assert!(err.to_string().contains("width"));
    assert!(store.all().unwrap().is_empty());
}

#[test]
fn test_whitelisted_function() {
    let (engine, _, _) = engine();
    let element = Element::new("Column").with_parameter("area", 16.0);
    let assembly = Assembly::new("C", "Side", "sqrt(area)", Unit::Metre);

    let quantity = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap();

    assert!(approx(quantity.value, 4.0));
    assert!(quantity
        .result
        .calculation_steps
        .iter()
        .any(|s| s.kind == StepKind::FunctionCall));
}

#[test]
fn test_unknown_function_rejected() {
    let (engine, _, _) = engine();
    let element = Element::new("Column").with_parameter("area", 16.0);
    let assembly = Assembly::new("C", "Side", "cbrt(area)", Unit::Metre);

    let err = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Formula);
}

#[test]
fn test_every_denylisted_identifier_rejected() {
    let (engine, audit, _) = engine();
    let element = wall();

    for word in DENYLIST {
        let assembly = Assembly::new("X", "Denied", format!("length + {}(1)", word), Unit::Metre);
        let err = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Formula, "'{}' was not rejected", word);
    }
    assert_eq!(audit.count(), DENYLIST.len());
}

#[test]
fn test_negative_result_warns() {
    let (engine, _, store) = engine();
    let element = Element::new("Adjustment").with_parameter("length", -5.0);
    let assembly = Assembly::new("L", "Length", "length", Unit::Metre);

    let quantity = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap();

    assert!(approx(quantity.value, -5.0));
    assert_eq!(quantity.warnings, vec![CalculationWarning::NegativeResult { value: -5.0 }]);
    assert_eq!(store.for_element(&element.id).unwrap().len(), 1);
}

#[test]
fn test_formula_unit_standardized() {
    let (engine, _, _) = engine();
    let element = Element::new("Pad")
        .with_parameter("length", 1000.0)
        .with_parameter("width", 1000.0)
        .with_parameter("depth", 500.0);
    let assembly = Assembly::new("P", "Pad", "length * width * depth", Unit::CubicMetre)
        .with_formula_unit(Unit::CubicMillimetre);

    let quantity = engine.calculate(Some(&element), Some(&assembly), &Actor::System).unwrap();

    assert!(approx(quantity.result.raw_result, 5.0e8));
    assert!(approx(quantity.value, 0.5));
    let last = quantity.result.calculation_steps.last().unwrap();
    assert_eq!(last.kind, StepKind::UnitConversion);
}

#[test]
fn test_matching_units_convert_as_identity() {
    let (engine, _, _) = engine();
    let assembly = Assembly::new("A", "Volume", "length * width * height", Unit::CubicMetre);

    let quantity = engine.calculate(Some(&wall()), Some(&assembly), &Actor::System).unwrap();

    assert_eq!(quantity.result.raw_result, quantity.value);
    let last = quantity.result.calculation_steps.last().unwrap();
    assert_eq!(last.kind, StepKind::UnitConversion);
    assert_eq!(last.detail.as_deref(), Some("identity"));
}

#[test]
fn test_one_audit_record_per_attempt() {
    let (engine, audit, _) = engine();
    let element = wall();
    let actor = Actor::user("qs@example.com");

    let attempts = [
        Assembly::new("OK", "Volume", "length * width * height", Unit::CubicMetre),
        Assembly::new("P", "Param", "length * depth", Unit::SquareMetre)
            .with_schema(ParameterSchema::new().require(["depth"])),
        Assembly::new("F", "Formula", "length +", Unit::Metre),
        Assembly::new("U", "Unit", "length", Unit::CubicMetre).with_formula_unit(Unit::Metre),
        Assembly::new("C", "Calc", "pow(10, 400)", Unit::Metre),
    ];
    for assembly in &attempts {
        let _ = engine.calculate(Some(&element), Some(assembly), &actor);
    }
    let _ = engine.calculate(None, attempts.first(), &actor);

    let records = audit.records().unwrap();
    assert_eq!(records.len(), attempts.len() + 1);
    assert_eq!(records.iter().filter(|r| r.is_success()).count(), 1);

    let kinds: Vec<_> = records.iter().filter_map(|r| r.error()).map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ErrorKind::Parameter,
            ErrorKind::Formula,
            ErrorKind::Unit,
            ErrorKind::Calculation,
            ErrorKind::Parameter,
        ]
    );
    assert!(records.iter().all(|r| r.actor == actor));
    assert!(records.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(audit.by_status(AuditStatus::Failure).unwrap().len(), 5);
}

#[test]
fn test_batch_isolates_failures() {
    let (engine, audit, store) = engine();
    let element = wall();
    let catalog: Catalog = vec![
        Assembly::new("W1", "Area", "length * height", Unit::SquareMetre).with_classification("wall"),
        Assembly::new("W2", "Broken", "length * missing_name", Unit::SquareMetre).with_classification("wall"),
        Assembly::new("W3", "Volume", "length * width * height", Unit::CubicMetre).with_classification("wall"),
        Assembly::new("S1", "Slab", "length * width", Unit::SquareMetre).with_classification("slab"),
    ]
    .into_iter()
    .collect();

    let report = engine.recalculate_all(&element, &catalog, &Actor::System).unwrap();

    assert!(!report.cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.created.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].assembly_code, "W2");
    assert_eq!(store.for_element(&element.id).unwrap().len(), 2);
    assert_eq!(audit.count(), 3);
}

#[test]
fn test_recalculation_is_idempotent() {
    let (engine, _, store) = engine();
    let element = wall();
    let catalog: Catalog = vec![
        Assembly::new("W1", "Area", "length * height", Unit::SquareMetre).with_classification("wall"),
        Assembly::new("W3", "Volume", "length * width * height", Unit::CubicMetre).with_classification("wall"),
    ]
    .into_iter()
    .collect();

    engine.recalculate_all(&element, &catalog, &Actor::System).unwrap();
    let first: Vec<f64> = store.for_element(&element.id).unwrap().iter().map(|q| q.value).collect();
    engine.recalculate_all(&element, &catalog, &Actor::System).unwrap();
    let second: Vec<f64> = store.for_element(&element.id).unwrap().iter().map(|q| q.value).collect();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}
