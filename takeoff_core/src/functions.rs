//! # Function Registry
//!
//! The closed set of functions and constants a formula may reference. The
//! table is built once and never mutated; the evaluator receives it by
//! reference alongside the parameter context.
//!
//! Anything that looks like a call but is not listed here is rejected by the
//! evaluator before any argument is evaluated.
//!
//! ## Usage
//!
//! ```rust
//! use takeoff_core::functions::{Argument, Function, FunctionRegistry};
//!
//! let registry = FunctionRegistry::standard();
//! let sqrt = registry.function("sqrt").unwrap();
//! assert_eq!(sqrt, Function::Sqrt);
//! assert_eq!(sqrt.apply(&[Argument::Number(16.0)]).unwrap(), 4.0);
//! assert!(registry.function("system").is_none());
//! ```

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::units::{self, Unit};

// ============================================================================
// Argument Kinds
// ============================================================================

/// What a function parameter expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Any numeric expression
    Number,
    /// A unit name, written as a bare identifier (`mm`) or the name of a
    /// string parameter holding one
    Unit,
}

/// A resolved argument passed to [`Function::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    Number(f64),
    Unit(Unit),
}

impl Argument {
    fn number(&self, function: Function, index: usize) -> CalcResult<f64> {
        match self {
            Argument::Number(v) => Ok(*v),
            Argument::Unit(u) => Err(CalcError::formula(
                function.name(),
                format!("argument {} must be a number, got unit '{}'", index + 1, u),
            )),
        }
    }

    fn unit(&self, function: Function, index: usize) -> CalcResult<Unit> {
        match self {
            Argument::Unit(u) => Ok(*u),
            Argument::Number(v) => Err(CalcError::formula(
                function.name(),
                format!("argument {} must be a unit, got {}", index + 1, v),
            )),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// A whitelisted formula function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Sqrt,
    Pow,
    Abs,
    Round,
    Ceil,
    Floor,
    Max,
    Min,
    ToMm,
    ToM,
    ToM2,
    ToM3,
}

impl Function {
    pub const ALL: [Function; 12] = [
        Function::Sqrt,
        Function::Pow,
        Function::Abs,
        Function::Round,
        Function::Ceil,
        Function::Floor,
        Function::Max,
        Function::Min,
        Function::ToMm,
        Function::ToM,
        Function::ToM2,
        Function::ToM3,
    ];

    /// Name as written in formulas
    pub fn name(&self) -> &'static str {
        match self {
            Function::Sqrt => "sqrt",
            Function::Pow => "pow",
            Function::Abs => "abs",
            Function::Round => "round",
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Max => "max",
            Function::Min => "min",
            Function::ToMm => "to_mm",
            Function::ToM => "to_m",
            Function::ToM2 => "to_m2",
            Function::ToM3 => "to_m3",
        }
    }

    /// Declared parameters, optional ones last
    pub fn params(&self) -> &'static [ParamKind] {
        match self {
            Function::Sqrt | Function::Abs | Function::Ceil | Function::Floor => &[ParamKind::Number],
            Function::Pow | Function::Max | Function::Min | Function::Round => {
                &[ParamKind::Number, ParamKind::Number]
            }
            Function::ToMm | Function::ToM | Function::ToM2 | Function::ToM3 => {
                &[ParamKind::Number, ParamKind::Unit]
            }
        }
    }

    /// Fewest arguments accepted
    pub fn min_arity(&self) -> usize {
        match self {
            Function::Round => 1,
            _ => self.params().len(),
        }
    }

    /// Most arguments accepted
    pub fn max_arity(&self) -> usize {
        self.params().len()
    }

    /// Usage line for documentation, e.g. `pow(x, y)`
    pub fn signature(&self) -> &'static str {
        match self {
            Function::Sqrt => "sqrt(x)",
            Function::Pow => "pow(x, y)",
            Function::Abs => "abs(x)",
            Function::Round => "round(x[, precision])",
            Function::Ceil => "ceil(x)",
            Function::Floor => "floor(x)",
            Function::Max => "max(x, y)",
            Function::Min => "min(x, y)",
            Function::ToMm => "to_mm(value, from_unit)",
            Function::ToM => "to_m(value, from_unit)",
            Function::ToM2 => "to_m2(value, from_unit)",
            Function::ToM3 => "to_m3(value, from_unit)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Function::Sqrt => "Square root. Negative input is an error.",
            Function::Pow => "x raised to the power y.",
            Function::Abs => "Absolute value.",
            Function::Round => "Round half away from zero to `precision` decimal places (default 0).",
            Function::Ceil => "Smallest integer not less than x.",
            Function::Floor => "Largest integer not greater than x.",
            Function::Max => "Larger of two values.",
            Function::Min => "Smaller of two values.",
            Function::ToMm => "Convert a length to millimetres.",
            Function::ToM => "Convert a length to metres.",
            Function::ToM2 => "Convert an area to square metres.",
            Function::ToM3 => "Convert a volume to cubic metres.",
        }
    }

    /// Target unit for the conversion helpers
    pub fn conversion_target(&self) -> Option<Unit> {
        match self {
            Function::ToMm => Some(Unit::Millimetre),
            Function::ToM => Some(Unit::Metre),
            Function::ToM2 => Some(Unit::SquareMetre),
            Function::ToM3 => Some(Unit::CubicMetre),
            _ => None,
        }
    }

    /// Apply the function to already-resolved arguments.
    ///
    /// Arity is checked here as well as in the evaluator so the function can be
    /// called directly.
    pub fn apply(&self, args: &[Argument]) -> CalcResult<f64> {
        if args.len() < self.min_arity() || args.len() > self.max_arity() {
            return Err(CalcError::formula(
                self.name(),
                arity_message(*self, args.len()),
            ));
        }

        let x = args[0].number(*self, 0)?;
        let result = match self {
            Function::Sqrt => {
                if x < 0.0 {
                    return Err(CalcError::formula(
                        format!("sqrt({})", x),
                        "square root of a negative number",
                    ));
                }
                x.sqrt()
            }
            Function::Abs => x.abs(),
            Function::Ceil => x.ceil(),
            Function::Floor => x.floor(),
            Function::Pow => x.powf(args[1].number(*self, 1)?),
            Function::Max => x.max(args[1].number(*self, 1)?),
            Function::Min => x.min(args[1].number(*self, 1)?),
            Function::Round => {
                let precision = match args.get(1) {
                    Some(arg) => precision_of(arg.number(*self, 1)?)?,
                    None => 0,
                };
                round_to(x, precision)
            }
            Function::ToMm => units::convert(x, args[1].unit(*self, 1)?, Unit::Millimetre)?,
            Function::ToM => units::convert(x, args[1].unit(*self, 1)?, Unit::Metre)?,
            Function::ToM2 => units::convert(x, args[1].unit(*self, 1)?, Unit::SquareMetre)?,
            Function::ToM3 => units::convert(x, args[1].unit(*self, 1)?, Unit::CubicMetre)?,
        };
        Ok(result)
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Human-readable arity mismatch, shared with the evaluator
pub(crate) fn arity_message(function: Function, got: usize) -> String {
    let (min, max) = (function.min_arity(), function.max_arity());
    if min == max {
        format!("{} expects {} argument(s), got {}", function.name(), min, got)
    } else {
        format!("{} expects {} to {} arguments, got {}", function.name(), min, max, got)
    }
}

fn precision_of(value: f64) -> CalcResult<i32> {
    if value.fract() != 0.0 || !(-12.0..=12.0).contains(&value) {
        return Err(CalcError::formula(
            format!("round(_, {})", value),
            "precision must be a whole number between -12 and 12",
        ));
    }
    Ok(value as i32)
}

fn round_to(x: f64, precision: i32) -> f64 {
    match precision {
        0 => x.round(),
        p if p > 0 => {
            let factor = 10f64.powi(p);
            (x * factor).round() / factor
        }
        p => {
            let factor = 10f64.powi(-p);
            (x / factor).round() * factor
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Read-only lookup table of functions and named constants.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<&'static str, Function>,
    constants: BTreeMap<&'static str, f64>,
}

static STANDARD: Lazy<FunctionRegistry> = Lazy::new(|| FunctionRegistry {
    functions: Function::ALL.iter().map(|f| (f.name(), *f)).collect(),
    constants: BTreeMap::from([("PI", std::f64::consts::PI), ("E", std::f64::consts::E)]),
});

impl FunctionRegistry {
    /// The standard library available to every assembly formula
    pub fn standard() -> &'static FunctionRegistry {
        &STANDARD
    }

    /// Look up a whitelisted function by its formula name
    pub fn function(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }

    /// Look up a named constant (`PI`, `E`)
    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = Function> + '_ {
        self.functions.values().copied()
    }

    pub fn constants(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.constants.iter().map(|(k, v)| (*k, *v))
    }
}

/// Generate the function reference (FUNCTIONS.md) from the registry.
pub fn generate_functions_markdown() -> String {
    let registry = FunctionRegistry::standard();
    let mut md = String::new();

    md.push_str("# Formula Function Reference\n\n");
    md.push_str("<!-- Generated by `cargo run --bin gen-functions`. Do not edit by hand. -->\n\n");
    md.push_str("Assembly formulas may use `+ - * /`, parentheses, parameters, and the items below. ");
    md.push_str("Nothing else is callable.\n\n");

    md.push_str("## Functions\n\n");
    md.push_str("| Signature | Description |\n");
    md.push_str("|-----------|-------------|\n");
    for function in registry.functions() {
        md.push_str(&format!("| `{}` | {} |\n", function.signature(), function.description()));
    }

    md.push_str("\n## Constants\n\n");
    md.push_str("| Name | Value |\n");
    md.push_str("|------|-------|\n");
    for (name, value) in registry.constants() {
        md.push_str(&format!("| `{}` | {} |\n", name, value));
    }

    md.push_str("\n## Units\n\n");
    md.push_str("Conversion helpers accept these unit names as their second argument:\n\n");
    for unit in Unit::ALL {
        md.push_str(&format!("- `{}` ({})\n", unit.symbol(), unit.family().display_name()));
    }

    md
}
