//! Formula tokenizer and the screens that run before it.
//!
//! Order matters: the denylist runs on the raw text first so that forbidden
//! words are reported as such even when surrounded by characters the
//! character screen would also reject.

use crate::errors::{CalcError, CalcResult};

/// Identifiers that name execution, reflection or I/O facilities in common
/// scripting runtimes. None of them can mean anything in a formula.
pub const DENYLIST: &[&str] = &[
    "eval",
    "exec",
    "system",
    "spawn",
    "fork",
    "syscall",
    "popen",
    "require",
    "require_relative",
    "load",
    "import",
    "send",
    "public_send",
    "instance_eval",
    "instance_exec",
    "class_eval",
    "module_eval",
    "instance_variable_get",
    "instance_variable_set",
    "const_get",
    "const_set",
    "define_method",
    "binding",
    "kernel",
    "process",
    "open",
    "exit",
    "abort",
    "constructor",
    "prototype",
    "globalthis",
    "window",
    "document",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// Token plus its byte offset in the formula, for error messages
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_allowed(c: char) -> bool {
    is_ident_char(c) || c.is_ascii_whitespace() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.' | ',')
}

/// Reject formulas naming any denylisted identifier (case-insensitive) or
/// any identifier starting with a double underscore.
pub fn check_denylist(formula: &str) -> CalcResult<()> {
    for word in formula.split(|c: char| !is_ident_char(c)).filter(|w| !w.is_empty()) {
        let lower = word.to_ascii_lowercase();
        if lower.starts_with("__") || DENYLIST.contains(&lower.as_str()) {
            return Err(CalcError::formula(
                formula,
                format!("forbidden identifier '{}'", word),
            ));
        }
    }
    Ok(())
}

/// Reject any character outside digits, ASCII letters, `_`, whitespace and `+ - * / ( ) . ,`
pub fn check_characters(formula: &str) -> CalcResult<()> {
    if let Some((offset, c)) = formula.char_indices().find(|(_, c)| !is_allowed(*c)) {
        return Err(CalcError::formula(
            formula,
            format!("invalid character '{}' at offset {}", c.escape_default(), offset),
        ));
    }
    Ok(())
}

/// Split a screened formula into tokens.
pub fn tokenize(formula: &str) -> CalcResult<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = formula.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let simple = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = simple {
            tokens.push(Spanned { token, offset });
            i += 1;
            continue;
        }

        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            // Exponent only when digits follow: `2e3`, `1.5E-2`
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let end = chars.get(i).map(|(o, _)| *o).unwrap_or(formula.len());
            let text = &formula[offset..end];
            let value: f64 = text
                .parse()
                .map_err(|_| CalcError::formula(text, format!("invalid number at offset {}", chars[start].0)))?;
            tokens.push(Spanned {
                token: Token::Number(value),
                offset,
            });
        } else if is_ident_start(c) {
            while i < chars.len() && is_ident_char(chars[i].1) {
                i += 1;
            }
            let end = chars.get(i).map(|(o, _)| *o).unwrap_or(formula.len());
            tokens.push(Spanned {
                token: Token::Ident(formula[offset..end].to_string()),
                offset,
            });
        } else {
            return Err(CalcError::formula(
                formula,
                format!("unexpected character '{}' at offset {}", c.escape_default(), offset),
            ));
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<Token> {
        tokenize(formula).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        assert_eq!(
            kinds("length * (width + 0.3)"),
            vec![
                Token::Ident("length".into()),
                Token::Star,
                Token::LParen,
                Token::Ident("width".into()),
                Token::Plus,
                Token::Number(0.3),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_tokenize_exponent_and_leading_dot() {
        assert_eq!(kinds("2e3"), vec![Token::Number(2000.0)]);
        assert_eq!(kinds("1.5E-2"), vec![Token::Number(0.015)]);
        assert_eq!(kinds(".5"), vec![Token::Number(0.5)]);
        // `E` without digits is the constant, not an exponent
        assert_eq!(kinds("2*E"), vec![Token::Number(2.0), Token::Star, Token::Ident("E".into())]);
    }

    #[test]
    fn test_invalid_number() {
        let err = tokenize("1.2.3").unwrap_err();
        assert_eq!(err.error_code(), "FORMULA_ERROR");
    }

    #[test]
    fn test_offsets() {
        let tokens = tokenize("a + bc").unwrap();
        assert_eq!(tokens[2].offset, 4);
    }

    #[test]
    fn test_character_screen() {
        assert!(check_characters("to_m(length, mm) * 2").is_ok());
        for bad in ["a; b", "`ls`", "a[0]", "'x'", "a = 1", "a ^ 2", "é", "a\\b"] {
            assert!(check_characters(bad).is_err(), "should reject {}", bad);
        }
    }

    #[test]
    fn test_denylist_each_token() {
        for word in DENYLIST {
            let formula = format!("{}(length)", word);
            let err = check_denylist(&formula).unwrap_err();
            assert!(err.to_string().contains("forbidden identifier"), "{} not rejected", word);
        }
    }

    #[test]
    fn test_denylist_is_case_insensitive_and_whole_word() {
        assert!(check_denylist("EVAL(1)").is_err());
        assert!(check_denylist("__class__").is_err());
        assert!(check_denylist("system_length * 2").is_ok());
        assert!(check_denylist("opening_width").is_ok());
    }
}
