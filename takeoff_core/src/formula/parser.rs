//! Recursive-descent parser.
//!
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = unary (('*' | '/') unary)*
//! unary   = ('-' | '+') unary | primary
//! primary = NUMBER | IDENT | IDENT '(' args? ')' | '(' expr ')'
//! args    = expr (',' expr)*
//! ```

use crate::errors::{CalcError, CalcResult};
use crate::functions::{arity_message, FunctionRegistry, ParamKind};

use super::ast::{Expr, Operator};
use super::lexer::{Spanned, Token};
use super::truncate;

/// Nesting limit for parentheses, unary chains and calls
const MAX_DEPTH: usize = 64;

/// Binary operators allowed in one formula. Each one adds a level to the
/// left-nested tree that evaluation and display walk recursively.
pub const MAX_OPERATORS: usize = 1024;

pub struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Spanned],
    registry: &'a FunctionRegistry,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: &'a [Spanned], registry: &'a FunctionRegistry) -> Self {
        Self {
            source,
            tokens,
            registry,
            pos: 0,
            depth: 0,
            operators: 0,
        }
    }

    /// Parse the whole token stream as one expression.
    pub fn parse(mut self) -> CalcResult<Expr> {
        if self.tokens.is_empty() {
            return Err(CalcError::formula(self.source, "formula is empty"));
        }
        let expr = self.parse_expr()?;
        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(self.error_at(extra, format!("unexpected '{}'", extra.token)));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<&'a Spanned> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error_at(&self, at: &Spanned, reason: String) -> CalcError {
        CalcError::formula(self.source, format!("{} at offset {}", reason, at.offset))
    }

    fn unexpected_end(&self) -> CalcError {
        CalcError::formula(self.source, "unexpected end of formula")
    }

    fn enter(&mut self) -> CalcResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::formula(
                self.source,
                format!("nesting deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn count_operator(&mut self) -> CalcResult<()> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(CalcError::formula(
                truncate(self.source, 40),
                format!("more than {} operators", MAX_OPERATORS),
            ));
        }
        Ok(())
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> CalcResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Operator::Add,
                Some(Token::Minus) => Operator::Sub,
                _ => break,
            };
            self.count_operator()?;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    // term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> CalcResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Operator::Mul,
                Some(Token::Slash) => Operator::Div,
                _ => break,
            };
            self.count_operator()?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | primary
    fn parse_unary(&mut self) -> CalcResult<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary()?;
                self.leave();
                Ok(Expr::negate(operand))
            }
            Some(Token::Plus) => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary()?;
                self.leave();
                Ok(operand)
            }
            _ => self.parse_primary(),
        }
    }

    // primary = NUMBER | IDENT | IDENT '(' args? ')' | '(' expr ')'
    fn parse_primary(&mut self) -> CalcResult<Expr> {
        let spanned = self.advance().ok_or_else(|| self.unexpected_end())?;
        match &spanned.token {
            Token::Number(value) => Ok(Expr::literal(*value)),
            Token::Ident(name) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.parse_call(name, spanned)
                } else {
                    Ok(Expr::identifier(name.clone()))
                }
            }
            Token::LParen => {
                self.enter()?;
                let inner = self.parse_expr()?;
                self.leave();
                self.expect_rparen(spanned)?;
                Ok(inner)
            }
            other => Err(self.error_at(spanned, format!("unexpected '{}'", other))),
        }
    }

    fn expect_rparen(&mut self, opened: &Spanned) -> CalcResult<()> {
        match self.advance() {
            Some(Spanned {
                token: Token::RParen,
                ..
            }) => Ok(()),
            Some(other) => Err(self.error_at(other, format!("expected ')' but found '{}'", other.token))),
            None => Err(self.error_at(opened, "unclosed '('".to_string())),
        }
    }

    fn parse_call(&mut self, name: &str, at: &Spanned) -> CalcResult<Expr> {
        // Reject before looking at the arguments
        let function = self.registry.function(name).ok_or_else(|| {
            CalcError::formula(
                format!("{}(...)", name),
                format!("'{}' is not an allowed function (offset {})", name, at.offset),
            )
        })?;

        let open = self.advance().ok_or_else(|| self.unexpected_end())?;
        self.enter()?;

        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.leave();
        self.expect_rparen(open)?;

        let got = args.len();
        if got < function.min_arity() || got > function.max_arity() {
            let call = Expr::Call { function, args };
            return Err(CalcError::formula(call.to_string(), arity_message(function, got)));
        }

        let args = args
            .into_iter()
            .zip(function.params())
            .map(|(arg, kind)| match (kind, arg) {
                (ParamKind::Unit, Expr::Identifier { name }) => Ok(Expr::UnitName { name }),
                (ParamKind::Unit, other) => Err(CalcError::formula(
                    format!("{}(..., {})", function.name(), other),
                    "expected a unit name such as mm, m2 or m3",
                )),
                (ParamKind::Number, arg) => Ok(arg),
            })
            .collect::<CalcResult<Vec<_>>>()?;

        Ok(Expr::Call { function, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::lexer::tokenize;
    use crate::functions::Function;

    fn parse(source: &str) -> CalcResult<Expr> {
        let tokens = tokenize(source)?;
        Parser::new(source, &tokens, FunctionRegistry::standard()).parse()
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(parse("1 + 2 * 3").unwrap().to_string(), "1 + 2 * 3");
        assert_eq!(parse("(1 + 2) * 3").unwrap().to_string(), "(1 + 2) * 3");
        // left associative: (8 - 3) - 2
        let expr = parse("8 - 3 - 2").unwrap();
        match expr {
            Expr::BinaryOp { op: Operator::Sub, lhs, .. } => {
                assert!(matches!(*lhs, Expr::BinaryOp { op: Operator::Sub, .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_unary() {
        assert_eq!(parse("-length").unwrap(), Expr::negate(Expr::identifier("length")));
        assert_eq!(parse("+2").unwrap(), Expr::literal(2.0));
        assert_eq!(parse("2 * -3").unwrap().to_string(), "2 * -3");
    }

    #[test]
    fn test_calls() {
        let expr = parse("round(sqrt(area), 2)").unwrap();
        match expr {
            Expr::Call { function: Function::Round, args } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(args[0], Expr::Call { function: Function::Sqrt, .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(parse("round(x)").is_ok());
    }

    #[test]
    fn test_unit_argument_becomes_unit_name() {
        let expr = parse("to_m(length, mm)").unwrap();
        assert_eq!(expr.unit_names().into_iter().collect::<Vec<_>>(), vec!["mm".to_string()]);
        assert_eq!(expr.identifiers().into_iter().collect::<Vec<_>>(), vec!["length".to_string()]);

        let err = parse("to_m(length, 2)").unwrap_err();
        assert!(err.to_string().contains("expected a unit name"));
    }

    #[test]
    fn test_unknown_function_rejected() {
        let err = parse("drop_tables(length)").unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_ERROR");
        assert!(err.to_string().contains("'drop_tables' is not an allowed function"));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = parse("pow(2)").unwrap_err();
        assert!(err.to_string().contains("pow(2)"));
        assert!(err.to_string().contains("expects 2 argument(s), got 1"));
        assert!(parse("sqrt()").is_err());
        assert!(parse("max(1, 2, 3)").is_err());
    }

    #[test]
    fn test_syntax_errors() {
        for bad in ["", "1 +", "(1 + 2", "1 + 2)", "length width", "*2", "sqrt(1,)", "()"] {
            let err = parse(bad).unwrap_err();
            assert_eq!(err.error_code(), "FORMULA_ERROR", "{}", bad);
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        let err = parse(&deep).unwrap_err();
        assert!(err.to_string().contains("nesting deeper"));
        let ok = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_operator_limit() {
        let chain = |operands: usize| vec!["1"; operands].join("+");
        assert!(parse(&chain(MAX_OPERATORS + 1)).is_ok());

        let err = parse(&chain(MAX_OPERATORS + 2)).unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_ERROR");
        assert!(err.to_string().contains("more than 1024 operators"));

        // mixed operators share the budget
        let mixed = format!("{} * 2", chain(MAX_OPERATORS + 1));
        assert!(parse(&mixed).is_err());
    }
}
