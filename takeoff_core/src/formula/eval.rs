//! Tree-walking interpreter.
//!
//! Evaluates an [`Expr`] bottom-up against a [`ParameterContext`] and a
//! [`FunctionRegistry`], recording a [`CalculationStep`] for every
//! substitution, constant and function application.

use crate::context::{ParameterContext, ParameterValue};
use crate::errors::{CalcError, CalcResult};
use crate::functions::{Argument, Function, FunctionRegistry};
use crate::trace::{CalculationStep, StepKind};
use crate::units::Unit;

use super::ast::{Expr, Operator};

pub struct Evaluator<'a> {
    context: &'a ParameterContext,
    registry: &'a FunctionRegistry,
    steps: Vec<CalculationStep>,
    max_steps: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a ParameterContext, registry: &'a FunctionRegistry, max_steps: usize) -> Self {
        Self {
            context,
            registry,
            steps: Vec::new(),
            max_steps,
        }
    }

    /// Consume the evaluator, returning the recorded trace
    pub fn into_steps(self) -> Vec<CalculationStep> {
        self.steps
    }

    fn push(&mut self, step: CalculationStep) -> CalcResult<()> {
        if self.steps.len() >= self.max_steps {
            return Err(CalcError::formula(
                step.expression,
                format!("evaluation exceeded {} trace steps", self.max_steps),
            ));
        }
        tracing::trace!(step = %step, "formula step");
        self.steps.push(step);
        Ok(())
    }

    pub fn eval(&mut self, expr: &Expr) -> CalcResult<f64> {
        match expr {
            Expr::Literal { value } => Ok(*value),
            Expr::Identifier { name } => self.resolve(name),
            Expr::UnitName { name } => Err(CalcError::formula(
                name.clone(),
                "a unit name cannot be used as a number",
            )),
            Expr::Negate { operand } => Ok(-self.eval(operand)?),
            Expr::BinaryOp { op, lhs, rhs } => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                match op {
                    Operator::Add => Ok(left + right),
                    Operator::Sub => Ok(left - right),
                    Operator::Mul => Ok(left * right),
                    Operator::Div => {
                        if right == 0.0 {
                            return Err(CalcError::formula(expr.to_string(), "division by zero"));
                        }
                        Ok(left / right)
                    }
                }
            }
            Expr::Call { function, args } => self.call(expr, *function, args),
        }
    }

    fn resolve(&mut self, name: &str) -> CalcResult<f64> {
        if let Some(bound) = self.context.get(name) {
            return match bound.as_number() {
                Some(value) => {
                    self.push(CalculationStep::new(StepKind::Substitution, name, value))?;
                    Ok(value)
                }
                None => Err(CalcError::formula(
                    name,
                    format!("parameter has no numeric value (got {})", bound),
                )),
            };
        }
        if let Some(value) = self.registry.constant(name) {
            self.push(CalculationStep::new(StepKind::Constant, name, value))?;
            return Ok(value);
        }
        Err(CalcError::formula(name, "unresolved identifier"))
    }

    fn resolve_unit(&self, name: &str) -> CalcResult<(Unit, Option<String>)> {
        match self.context.get(name) {
            Some(ParameterValue::Text(text)) => {
                let unit = text.parse::<Unit>().map_err(|_| {
                    CalcError::unit(text.clone(), "?", format!("parameter '{}' names an unknown unit", name))
                })?;
                Ok((unit, Some(format!("{} = {}", name, unit))))
            }
            _ => {
                let unit = name
                    .parse::<Unit>()
                    .map_err(|_| CalcError::unit(name, "?", "unknown unit"))?;
                Ok((unit, None))
            }
        }
    }

    fn call(&mut self, expr: &Expr, function: Function, args: &[Expr]) -> CalcResult<f64> {
        let mut resolved = Vec::with_capacity(args.len());
        let mut details = Vec::new();
        for arg in args {
            match arg {
                Expr::UnitName { name } => {
                    let (unit, detail) = self.resolve_unit(name)?;
                    details.extend(detail);
                    resolved.push(Argument::Unit(unit));
                }
                other => resolved.push(Argument::Number(self.eval(other)?)),
            }
        }

        let value = function.apply(&resolved).map_err(|e| match e {
            CalcError::Formula { reason, .. } => CalcError::formula(expr.to_string(), reason),
            other => other,
        })?;

        let mut step = CalculationStep::new(StepKind::FunctionCall, expr.to_string(), value);
        if let Some(unit) = function.conversion_target() {
            step = step.with_unit(unit);
        }
        if !details.is_empty() {
            step = step.with_detail(details.join(", "));
        }
        self.push(step)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::parameters;
    use crate::formula::Formula;

    fn run(formula: &str, ctx: &ParameterContext) -> CalcResult<(f64, Vec<CalculationStep>)> {
        let parsed = Formula::parse(formula)?;
        let mut evaluator = Evaluator::new(ctx, FunctionRegistry::standard(), 100);
        let value = evaluator.eval(parsed.expr())?;
        Ok((value, evaluator.into_steps()))
    }

    #[test]
    fn test_substitution_steps_in_order() {
        let ctx = ParameterContext::new(parameters([
            ("length", ParameterValue::from(10.0)),
            ("width", "2".into()),
            ("height", ParameterValue::from(0.3)),
        ]));
        let (value, steps) = run("length * width * height", &ctx).unwrap();
        assert!((value - 6.0).abs() < 1e-12);
        let names: Vec<_> = steps.iter().map(|s| s.expression.as_str()).collect();
        assert_eq!(names, vec!["length", "width", "height"]);
        assert!(steps.iter().all(|s| s.kind == StepKind::Substitution));
    }

    #[test]
    fn test_function_step_records_subexpression() {
        let ctx = ParameterContext::new(parameters([("area", ParameterValue::from(16.0))]));
        let (value, steps) = run("sqrt(area)", &ctx).unwrap();
        assert_eq!(value, 4.0);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].kind, StepKind::FunctionCall);
        assert_eq!(steps[1].to_string(), "sqrt(area) = 4");
    }

    #[test]
    fn test_constants() {
        let ctx = ParameterContext::new(parameters([("r", ParameterValue::from(2.0))]));
        let (value, steps) = run("PI * pow(r, 2)", &ctx).unwrap();
        assert!((value - 4.0 * std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(steps[0].kind, StepKind::Constant);
    }

    #[test]
    fn test_unit_argument_from_parameter() {
        let ctx = ParameterContext::new(parameters([("length", ParameterValue::from(1200.0)), ("length_unit", "mm".into())]));
        let (value, steps) = run("to_m(length, length_unit)", &ctx).unwrap();
        assert!((value - 1.2).abs() < 1e-12);
        let call = steps.last().unwrap();
        assert_eq!(call.unit, Some(Unit::Metre));
        assert_eq!(call.detail.as_deref(), Some("length_unit = mm"));
    }

    #[test]
    fn test_bare_unit_argument() {
        let ctx = ParameterContext::new(parameters([("area", ParameterValue::from(2.0))]));
        let (value, _) = run("to_m2(area, ft2)", &ctx).unwrap();
        assert!((value - 2.0 * 0.09290304).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_unit_is_unit_error() {
        let ctx = ParameterContext::new(parameters([("length", ParameterValue::from(1.0))]));
        let err = run("to_m(length, furlong)", &ctx).unwrap_err();
        assert_eq!(err.error_code(), "UNIT_ERROR");
    }

    #[test]
    fn test_division_by_zero_names_subexpression() {
        let ctx = ParameterContext::new(parameters([("a", ParameterValue::from(1.0)), ("b", ParameterValue::from(0.0))]));
        let err = run("2 + a / b", &ctx).unwrap_err();
        match err {
            CalcError::Formula { expression, reason } => {
                assert_eq!(expression, "a / b");
                assert_eq!(reason, "division by zero");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_and_non_numeric_identifiers() {
        let ctx = ParameterContext::new(parameters([("finish", "smooth".into())]));
        let err = run("missing * 2", &ctx).unwrap_err();
        assert!(err.to_string().contains("unresolved identifier"));

        let err = run("finish * 2", &ctx).unwrap_err();
        assert!(err.to_string().contains("no numeric value"));
    }

    #[test]
    fn test_function_errors_name_the_call() {
        let ctx = ParameterContext::new(parameters([("x", ParameterValue::from(-4.0))]));
        let err = run("1 + sqrt(x)", &ctx).unwrap_err();
        match err {
            CalcError::Formula { expression, .. } => assert_eq!(expression, "sqrt(x)"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_step_limit() {
        let ctx = ParameterContext::new(parameters([("a", ParameterValue::from(1.0))]));
        let formula = vec!["a"; 101].join(" + ");
        let err = run(&formula, &ctx).unwrap_err();
        assert!(err.to_string().contains("exceeded 100 trace steps"));
    }
}
