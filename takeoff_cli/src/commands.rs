//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use takeoff_core::assembly::AssemblyCatalog;
use takeoff_core::audit::{AuditStatus, TracingSink};
use takeoff_core::context::{ParameterValue, Parameters};
use takeoff_core::formula::Formula;
use takeoff_core::functions::{generate_functions_markdown, FunctionRegistry};
use takeoff_core::prelude::*;
use takeoff_core::schema::ParameterType;
use takeoff_core::{file_io, units, FileLock, Project};
use uuid::Uuid;

/// Print an error (and its JSON form for calculation errors), then exit.
pub fn exit_with(error: &anyhow::Error) -> ! {
    eprintln!("Error: {:#}", error);
    if let Some(calc) = error.downcast_ref::<CalcError>() {
        if let Ok(json) = serde_json::to_string_pretty(calc) {
            eprintln!();
            eprintln!("Error JSON:");
            eprintln!("{}", json);
        }
    }
    if let Some(hint) = retry_hint(error) {
        eprintln!();
        eprintln!("{}", hint);
    }
    std::process::exit(1);
}

fn retry_hint(error: &anyhow::Error) -> Option<&'static str> {
    error
        .downcast_ref::<CalcError>()
        .filter(|calc| calc.is_recoverable())
        .map(|_| "The project is in use; try again once the other session has closed it.")
}

/// `name=value`; values that parse as numbers become numbers.
fn parse_param(raw: &str) -> Result<(String, ParameterValue)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("parameter '{}' is not in name=value form", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("parameter '{}' has no name", raw);
    }
    let value = value.trim();
    let value = match value.parse::<f64>() {
        Ok(number) if number.is_finite() => ParameterValue::Number(number),
        _ => ParameterValue::Text(value.to_string()),
    };
    Ok((name.to_string(), value))
}

pub fn eval(config: &EngineConfig, formula: &str, raw_params: &[String], json: bool) -> Result<()> {
    let params = raw_params
        .iter()
        .map(|p| parse_param(p))
        .collect::<Result<Parameters>>()?;

    let registry = FunctionRegistry::standard();
    let limits = config.limits();
    let parsed = Formula::parse_with(formula, registry, &limits)?;
    let evaluation = parsed.evaluate(&ParameterContext::new(params), registry, &limits)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        for (i, step) in evaluation.steps.iter().enumerate() {
            println!("{:>3}. {}", i + 1, step);
        }
        println!("= {}", evaluation.value);
    }
    Ok(())
}

pub fn convert(value: f64, from: &str, to: &str) -> Result<()> {
    let converted = units::convert_named(value, from, to)?;
    println!("{} {} = {} {}", value, from, converted, to);
    Ok(())
}

pub fn functions() -> Result<()> {
    print!("{}", generate_functions_markdown());
    Ok(())
}

pub fn init(path: &Path, estimator: &str, job: &str, client: &str, sample: bool, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let mut project = Project::new(estimator, job, client);
    if sample {
        add_sample(&mut project);
    }
    file_io::save_project(&project, path)?;
    println!(
        "Created {} ({} assemblies, {} elements)",
        path.display(),
        project.catalog.len(),
        project.element_count()
    );
    Ok(())
}

fn add_sample(project: &mut Project) {
    let slab_schema = ParameterSchema::new()
        .with(ParameterSpec::number("length").rule(ParameterRule::PositiveNumber).unit(Unit::Metre))
        .with(ParameterSpec::number("width").rule(ParameterRule::PositiveNumber).unit(Unit::Metre))
        .with(
            ParameterSpec::number("thickness")
                .minimum(0.05)
                .maximum(1.0)
                .unit(Unit::Metre),
        )
        .require(["length", "width", "thickness"]);

    project.add_assembly(
        Assembly::new("11.2.1", "Ground bearing slab", "length * width * thickness", Unit::CubicMetre)
            .with_classification("slab")
            .with_schema(slab_schema.clone()),
    );
    project.add_assembly(
        Assembly::new("11.2.2", "Slab edge formwork", "2 * (length + width) * thickness", Unit::SquareMetre)
            .with_classification("slab")
            .with_schema(slab_schema),
    );
    project.add_assembly(
        Assembly::new("11.2.3", "Mesh laps", "ceil(length / lap_spacing) * width", Unit::SquareMetre)
            .with_classification("slab")
            .with_schema(
                ParameterSchema::new()
                    .with(ParameterSpec::new("lap_spacing", ParameterType::Number).rule(ParameterRule::PositiveNumber))
                    .require(["length", "width", "lap_spacing"]),
            ),
    );
    project.add_element(
        Element::new("GF slab")
            .with_type("slab")
            .with_material("C32/40 concrete")
            .with_classification("slab")
            .with_parameter("length", 12.0)
            .with_parameter("width", 8.0)
            .with_parameter("thickness", 0.2),
    );
}

fn resolve_actor(explicit: Option<&str>, project: &Project, config: &EngineConfig) -> Result<Actor> {
    let actor = match explicit.or(project.settings.default_actor.as_deref()) {
        Some(raw) => raw.parse()?,
        None => config.actor()?,
    };
    Ok(actor)
}

fn find_element<'a>(project: &'a Project, key: &str) -> Result<&'a Element> {
    let by_id = Uuid::parse_str(key).ok().and_then(|id| project.get_element(&id));
    by_id
        .or_else(|| project.element_by_name(key))
        .ok_or_else(|| anyhow!("no element named '{}' in project", key))
}

fn find_assembly(project: &Project, key: &str) -> Result<Assembly> {
    let by_id = Uuid::parse_str(key).ok().and_then(|id| project.catalog.get(&id));
    by_id
        .or_else(|| project.catalog.by_code(key))
        .ok_or_else(|| anyhow!("no assembly with code '{}' in catalog", key))
}

/// Engine over the project's own quantities and audit trail.
fn project_engine(config: &EngineConfig, project: &Project) -> CalculationEngine {
    let mut audit = AuditLog::from_records(project.audit_log.clone());
    audit.add_sink(Box::new(TracingSink));
    let store = InMemoryQuantityStore::from_quantities(project.quantities.clone());
    CalculationEngine::new(config.clone(), Arc::new(audit), Arc::new(store))
}

/// Copy the engine's quantities and audit trail back into the project.
fn write_back(engine: &CalculationEngine, project: &mut Project) -> Result<()> {
    project.quantities = engine.store().all()?;
    project.audit_log = engine.audit().records()?;
    project.touch();
    Ok(())
}

/// Lock, load, mutate, save.
fn with_project<F>(path: &Path, user: &str, edit: F) -> Result<()>
where
    F: FnOnce(&mut Project) -> Result<()>,
{
    let _lock = FileLock::acquire(path, user)?;
    let mut project = file_io::load_project(path).with_context(|| format!("loading {}", path.display()))?;
    let outcome = edit(&mut project);
    // the audit trail is saved even when the calculation failed
    file_io::save_project(&project, path).with_context(|| format!("saving {}", path.display()))?;
    outcome
}

pub fn calculate(
    config: &EngineConfig,
    path: &Path,
    element_key: &str,
    assembly_key: &str,
    actor: Option<&str>,
) -> Result<()> {
    let user = actor.unwrap_or(&config.default_actor).to_string();
    with_project(path, &user, |project| {
        let actor = resolve_actor(actor, project, config)?;
        let element = find_element(project, element_key)?.clone();
        let assembly = find_assembly(project, assembly_key)?;

        let engine = project_engine(config, project);
        let result = engine.calculate(Some(&element), Some(&assembly), &actor);
        write_back(&engine, project)?;

        let quantity = result?;
        println!("{}: {} = {}", element.name, assembly.code, quantity);
        for warning in &quantity.warnings {
            println!("  warning: {}", warning);
        }
        Ok(())
    })
}

pub fn recalculate(config: &EngineConfig, path: &Path, element_key: &str, actor: Option<&str>) -> Result<()> {
    let user = actor.unwrap_or(&config.default_actor).to_string();
    with_project(path, &user, |project| {
        let actor = resolve_actor(actor, project, config)?;
        let element = find_element(project, element_key)?.clone();

        let engine = project_engine(config, project);
        let report = engine.recalculate_all(&element, &project.catalog, &actor);
        write_back(&engine, project)?;
        let report = report?;

        for quantity in &report.created {
            let code = project
                .catalog
                .get(&quantity.assembly_id)
                .map(|a| a.code)
                .unwrap_or_default();
            println!("  ok     {:<10} {}", code, quantity);
        }
        for failure in &report.failures {
            println!("  failed {:<10} {}", failure.assembly_code, failure.error);
        }
        println!(
            "{}: {} created, {} failed",
            element.name,
            report.created.len(),
            report.failures.len()
        );
        Ok(())
    })
}

pub fn audit(path: &Path, element_key: Option<&str>, failures_only: bool, json: bool) -> Result<()> {
    let project = file_io::load_project(path).with_context(|| format!("loading {}", path.display()))?;
    let log = AuditLog::from_records(project.audit_log.clone());

    let mut records = match element_key {
        Some(key) => log.for_element(&find_element(&project, key)?.id)?,
        None => log.records()?,
    };
    if failures_only {
        records.retain(|r| r.status() == AuditStatus::Failure);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No audit records");
    } else {
        for record in &records {
            println!("{}", record);
        }
    }
    Ok(())
}
