//! Boolean expression evaluation for `condition` nodes and path gates.
//!
//! Expressions are evaluated after template substitution, so operands are
//! literals by the time they arrive here: numbers, quoted strings,
//! `true`/`false`, `null`, and bare words (which compare as strings, since
//! substitution inserts strings unquoted).

use crate::workflow::errors::{FlowrunError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum ExprValue {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl ExprValue {
    fn as_num(&self) -> Option<f64> {
        match self {
            ExprValue::Num(n) => Some(*n),
            ExprValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            ExprValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

fn parse_error(message: impl Into<String>) -> FlowrunError {
    FlowrunError::ExpressionParse(message.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            literal.push(ch);
                            i += 1;
                        }
                        None => return Err(parse_error(format!("unterminated string in '{input}'"))),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '-' | '0'..='9' => {
                let start = i;
                if c == '-' {
                    i += 1;
                    if !matches!(chars.get(i), Some('0'..='9')) {
                        return Err(parse_error(format!("stray '-' in '{input}'")));
                    }
                }
                while matches!(chars.get(i), Some('0'..='9') | Some('.')) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse()
                    .map_err(|_| parse_error(format!("invalid number '{text}'")))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while matches!(
                    chars.get(i),
                    Some(ch) if ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '/')
                ) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Str(word),
                });
            }
            other => return Err(parse_error(format!("unexpected character '{other}' in '{input}'"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // or := and ("||" and)*
    fn parse_or(&mut self) -> Result<ExprValue> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            let (l, r) = logical_operands(&left, &right, "||")?;
            left = ExprValue::Bool(l || r);
        }
        Ok(left)
    }

    // and := cmp ("&&" cmp)*
    fn parse_and(&mut self) -> Result<ExprValue> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_comparison()?;
            let (l, r) = logical_operands(&left, &right, "&&")?;
            left = ExprValue::Bool(l && r);
        }
        Ok(left)
    }

    // cmp := primary (relop primary)?
    fn parse_comparison(&mut self) -> Result<ExprValue> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) | Some(Token::Ne) | Some(Token::Lt) | Some(Token::Le)
            | Some(Token::Gt) | Some(Token::Ge) => match self.advance() {
                Some(token) => token,
                None => return Ok(left),
            },
            _ => return Ok(left),
        };
        let right = self.parse_primary()?;
        Ok(ExprValue::Bool(compare(&op, &left, &right)?))
    }

    fn parse_primary(&mut self) -> Result<ExprValue> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(parse_error("missing closing parenthesis")),
                }
            }
            Some(Token::Num(n)) => Ok(ExprValue::Num(n)),
            Some(Token::Str(s)) => Ok(ExprValue::Str(s)),
            Some(Token::Bool(b)) => Ok(ExprValue::Bool(b)),
            Some(Token::Null) => Ok(ExprValue::Null),
            Some(other) => Err(parse_error(format!("unexpected token {other:?}"))),
            None => Err(parse_error("unexpected end of expression")),
        }
    }
}

fn logical_operands(left: &ExprValue, right: &ExprValue, op: &str) -> Result<(bool, bool)> {
    match (left.as_bool(), right.as_bool()) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Err(parse_error(format!("'{op}' requires boolean operands"))),
    }
}

fn compare(op: &Token, left: &ExprValue, right: &ExprValue) -> Result<bool> {
    match op {
        Token::Eq => Ok(values_equal(left, right)),
        Token::Ne => Ok(!values_equal(left, right)),
        _ => {
            let (l, r) = match (left.as_num(), right.as_num()) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return Err(parse_error(
                        "relational operators require numeric operands",
                    ))
                }
            };
            Ok(match op {
                Token::Lt => l < r,
                Token::Le => l <= r,
                Token::Gt => l > r,
                Token::Ge => l >= r,
                _ => unreachable!("comparison dispatch"),
            })
        }
    }
}

/// Equality coerces numerically when both sides are numeric (including
/// numeric strings); otherwise values compare structurally.
fn values_equal(left: &ExprValue, right: &ExprValue) -> bool {
    if let (Some(l), Some(r)) = (left.as_num(), right.as_num()) {
        return l == r;
    }
    match (left, right) {
        (ExprValue::Str(l), ExprValue::Str(r)) => l == r,
        (ExprValue::Bool(l), ExprValue::Bool(r)) => l == r,
        (ExprValue::Null, ExprValue::Null) => true,
        _ => false,
    }
}

/// Evaluate a substituted expression to its boolean result.
pub fn evaluate_bool(input: &str) -> Result<bool> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(parse_error("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parse_error(format!(
            "trailing tokens after expression in '{input}'"
        )));
    }
    value
        .as_bool()
        .ok_or_else(|| parse_error(format!("'{input}' does not evaluate to a boolean")))
}
