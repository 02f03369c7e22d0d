//! # Formula Evaluator
//!
//! Assembly formulas are a small arithmetic language: numbers, parameter
//! names, `+ - * /`, parentheses, and calls to the whitelisted functions of
//! the [`FunctionRegistry`]. There are no statements, assignments, strings,
//! loops or user-defined functions.
//!
//! Evaluation runs in four stages, each of which can reject the formula:
//!
//! 1. Screens: length limit, denylisted identifiers, character allowlist
//! 2. [`lexer`]: text to tokens
//! 3. [`parser`]: tokens to an [`Expr`] tree (unknown functions and arity
//!    mismatches are rejected here, before anything is evaluated)
//! 4. [`eval`]: bottom-up evaluation with a step trace
//!
//! ## Example
//!
//! ```rust
//! use takeoff_core::context::{parameters, ParameterContext, ParameterValue};
//! use takeoff_core::formula::evaluate;
//!
//! let ctx = ParameterContext::new(parameters([
//!     ("length", ParameterValue::from(10.0)),
//!     ("width", ParameterValue::from(2.0)),
//!     ("height", ParameterValue::from(0.3)),
//! ]));
//!
//! let evaluation = evaluate("length * width * height", &ctx).unwrap();
//! assert!((evaluation.value - 6.0).abs() < 1e-12);
//! assert_eq!(evaluation.steps.len(), 3);
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::ParameterContext;
use crate::errors::{CalcError, CalcResult};
use crate::functions::FunctionRegistry;
use crate::trace::CalculationStep;

pub use ast::{Expr, Operator};
pub use eval::Evaluator;

/// Limits applied while parsing and evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalLimits {
    /// Longest formula accepted, in bytes
    pub max_formula_length: usize,
    /// Most trace steps a single evaluation may record
    pub max_trace_steps: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        EvalLimits {
            max_formula_length: 2000,
            max_trace_steps: 10_000,
        }
    }
}

/// Result of evaluating a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub value: f64,
    pub steps: Vec<CalculationStep>,
}

/// A parsed formula, ready to evaluate any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parse with default limits against the standard registry.
    pub fn parse(source: &str) -> CalcResult<Self> {
        Self::parse_with(source, FunctionRegistry::standard(), &EvalLimits::default())
    }

    /// Screen, tokenize and parse `source`.
    pub fn parse_with(source: &str, registry: &FunctionRegistry, limits: &EvalLimits) -> CalcResult<Self> {
        if source.len() > limits.max_formula_length {
            return Err(CalcError::formula(
                truncate(source, 40),
                format!(
                    "formula is {} bytes, longer than the {} byte limit",
                    source.len(),
                    limits.max_formula_length
                ),
            ));
        }
        lexer::check_denylist(source)?;
        lexer::check_characters(source)?;
        let tokens = lexer::tokenize(source)?;
        let expr = parser::Parser::new(source, &tokens, registry).parse()?;
        Ok(Formula {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Names the formula reads as numbers (parameters and constants)
    pub fn identifiers(&self) -> BTreeSet<String> {
        self.expr.identifiers()
    }

    /// Evaluate against `context`. Pure: the same inputs give the same value and trace.
    pub fn evaluate(
        &self,
        context: &ParameterContext,
        registry: &FunctionRegistry,
        limits: &EvalLimits,
    ) -> CalcResult<Evaluation> {
        let mut evaluator = Evaluator::new(context, registry, limits.max_trace_steps);
        let value = evaluator.eval(&self.expr)?;
        Ok(Evaluation {
            value,
            steps: evaluator.into_steps(),
        })
    }
}

impl FromStr for Formula {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Parse and evaluate in one call with default limits and the standard registry.
pub fn evaluate(formula: &str, context: &ParameterContext) -> CalcResult<Evaluation> {
    let registry = FunctionRegistry::standard();
    let limits = EvalLimits::default();
    Formula::parse_with(formula, registry, &limits)?.evaluate(context, registry, &limits)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
