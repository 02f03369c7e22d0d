//! Expression tree for parsed formulas.
//!
//! The tree has exactly the shapes the grammar allows. Calls carry a
//! resolved [`Function`], so an unknown function cannot be represented at
//! all.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::functions::Function;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: f64,
    },
    Identifier {
        name: String,
    },
    /// Unit name in a conversion helper's unit position (`mm`, or a string parameter)
    UnitName {
        name: String,
    },
    Negate {
        operand: Box<Expr>,
    },
    BinaryOp {
        op: Operator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

const PREC_UNARY: u8 = 3;
const PREC_ATOM: u8 = 4;

impl Expr {
    pub fn literal(value: f64) -> Self {
        Expr::Literal { value }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Expr::Identifier { name: name.into() }
    }

    pub fn binary(op: Operator, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinaryOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Negate {
            operand: Box::new(operand),
        }
    }

    /// Parameter or constant names referenced as numbers, sorted
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect(&mut names, false);
        names
    }

    /// Names used in unit positions of conversion helpers, sorted
    pub fn unit_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect(&mut names, true);
        names
    }

    fn collect(&self, names: &mut BTreeSet<String>, units: bool) {
        match self {
            Expr::Literal { .. } => {}
            Expr::Identifier { name } => {
                if !units {
                    names.insert(name.clone());
                }
            }
            Expr::UnitName { name } => {
                if units {
                    names.insert(name.clone());
                }
            }
            Expr::Negate { operand } => operand.collect(names, units),
            Expr::BinaryOp { lhs, rhs, .. } => {
                lhs.collect(names, units);
                rhs.collect(names, units);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect(names, units);
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::BinaryOp { op, .. } => op.precedence(),
            Expr::Negate { .. } => PREC_UNARY,
            _ => PREC_ATOM,
        }
    }

    fn fmt_child(&self, f: &mut std::fmt::Formatter<'_>, parens: bool) -> std::fmt::Result {
        if parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

/// Canonical text with only the parentheses precedence requires.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal { value } => write!(f, "{}", value),
            Expr::Identifier { name } | Expr::UnitName { name } => write!(f, "{}", name),
            Expr::Negate { operand } => {
                write!(f, "-")?;
                operand.fmt_child(f, operand.precedence() < PREC_UNARY)
            }
            Expr::BinaryOp { op, lhs, rhs } => {
                let prec = op.precedence();
                lhs.fmt_child(f, lhs.precedence() < prec)?;
                write!(f, " {} ", op.symbol())?;
                // a - (b - c) and a / (b * c) keep their parentheses
                let right_parens = rhs.precedence() < prec
                    || (rhs.precedence() == prec && matches!(op, Operator::Sub | Operator::Div));
                rhs.fmt_child(f, right_parens)
            }
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_minimal_parentheses() {
        let expr = Expr::binary(
            Operator::Mul,
            Expr::binary(Operator::Add, Expr::identifier("a"), Expr::identifier("b")),
            Expr::identifier("c"),
        );
        assert_eq!(expr.to_string(), "(a + b) * c");

        let expr = Expr::binary(
            Operator::Sub,
            Expr::identifier("a"),
            Expr::binary(Operator::Sub, Expr::identifier("b"), Expr::literal(1.0)),
        );
        assert_eq!(expr.to_string(), "a - (b - 1)");

        let expr = Expr::negate(Expr::binary(Operator::Add, Expr::literal(1.0), Expr::literal(2.5)));
        assert_eq!(expr.to_string(), "-(1 + 2.5)");
    }

    #[test]
    fn test_identifiers_and_unit_names() {
        let expr = Expr::Call {
            function: Function::ToM,
            args: vec![
                Expr::binary(Operator::Mul, Expr::identifier("length"), Expr::identifier("PI")),
                Expr::UnitName { name: "length_unit".into() },
            ],
        };
        let ids: Vec<_> = expr.identifiers().into_iter().collect();
        assert_eq!(ids, vec!["PI".to_string(), "length".to_string()]);
        assert!(expr.unit_names().contains("length_unit"));
        assert_eq!(expr.to_string(), "to_m(length * PI, length_unit)");
    }
}
