//! Restricted boolean expression grammar for declarative `conditional` edges:
//! comparisons, `&&`/`||`/`!`, and literal JSON field access into `vars.*`
//! (the run's `VariableScope`) or `message.*` (the in-flight message's JSON
//! view). Deliberately not a general scripting language — no assignment, no
//! function calls, no loops.
//!
//! Grammar (lowest to highest precedence):
//!   or_expr    := and_expr ("||" and_expr)*
//!   and_expr   := unary ("&&" unary)*
//!   unary      := "!" unary | cmp_expr
//!   cmp_expr   := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//!   primary    := literal | path | "(" or_expr ")"
//!   path       := ident ("." ident)*

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::edge::ConditionalPredicate;
use crate::loader::variables::VariableScope;
use crate::message::Message;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("trailing input after expression: '{0}'")]
    TrailingInput(String),
    #[error("unknown path root '{0}' (expected 'vars' or 'message')")]
    UnknownRoot(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ConditionError::UnexpectedEof);
                }
                i += 1; // closing quote
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| ConditionError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(text),
                });
            }
            other => return Err(ConditionError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
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
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_primary()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance().ok_or(ConditionError::UnexpectedEof)? {
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
                    None => Err(ConditionError::UnexpectedEof),
                }
            }
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Number(n) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            )),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(path) => Ok(Expr::Path(path.split('.').map(str::to_string).collect())),
            other => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

fn parse(input: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        let rest: Vec<String> = parser.tokens[parser.pos..].iter().map(|t| format!("{t:?}")).collect();
        return Err(ConditionError::TrailingInput(rest.join(" ")));
    }
    Ok(expr)
}

fn resolve_path(path: &[String], vars: &VariableScope, message: &Value) -> Value {
    let Some((root, rest)) = path.split_first() else { return Value::Null };
    let mut current = match root.as_str() {
        "vars" => vars.get(rest.first().map(String::as_str).unwrap_or_default()).unwrap_or(Value::Null),
        "message" => message.clone(),
        _ => return Value::Null,
    };
    // For "vars.x.y" the first rest segment already selected the variable;
    // for "message.x.y" every rest segment walks a JSON field.
    let remaining: &[String] = if root == "vars" { &rest[1.min(rest.len())..] } else { rest };
    for field in remaining {
        current = current.get(field).cloned().unwrap_or(Value::Null);
    }
    current
}

fn eval(expr: &Expr, vars: &VariableScope, message: &Value) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(path) => resolve_path(path, vars, message),
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, vars, message))),
        Expr::And(l, r) => Value::Bool(truthy(&eval(l, vars, message)) && truthy(&eval(r, vars, message))),
        Expr::Or(l, r) => Value::Bool(truthy(&eval(l, vars, message)) || truthy(&eval(r, vars, message))),
        Expr::Cmp(op, l, r) => {
            let lv = eval(l, vars, message);
            let rv = eval(r, vars, message);
            Value::Bool(compare(*op, &lv, &rv))
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        _ => {
            let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) else { return false };
            match op {
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            }
        }
    }
}

/// Compiles `expr` into a `ConditionalPredicate` closed over `vars`. The
/// predicate reads `message.*` from the in-flight `Message`'s cached JSON
/// view and `vars.*` from the run's `VariableScope`.
pub fn compile_condition(expr: &str, vars: Arc<VariableScope>) -> Result<ConditionalPredicate, ConditionError> {
    let ast = parse(expr)?;
    Ok(Arc::new(move |msg: &Message| {
        let message_json = msg.to_json().unwrap_or(Value::Null);
        truthy(&eval(&ast, &vars, &message_json))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with(name: &str, value: Value) -> Arc<VariableScope> {
        let scope = VariableScope::default();
        scope.set(name, value);
        Arc::new(scope)
    }

    #[test]
    fn numeric_comparison_against_message_field() {
        let pred = compile_condition("message.score > 0.5", Arc::new(VariableScope::default())).unwrap();
        assert!(pred(&Message::new(serde_json::json!({"score": 0.9}))));
        assert!(!pred(&Message::new(serde_json::json!({"score": 0.1}))));
    }

    #[test]
    fn vars_lookup_and_equality() {
        let vars = scope_with("approved", Value::Bool(true));
        let pred = compile_condition("vars.approved == true", vars).unwrap();
        assert!(pred(&Message::new(serde_json::json!(null))));
    }

    #[test]
    fn and_or_not_compose() {
        let vars = scope_with("ready", Value::Bool(true));
        let pred = compile_condition("vars.ready && !(message.blocked == true)", vars).unwrap();
        assert!(pred(&Message::new(serde_json::json!({"blocked": false}))));
        assert!(!pred(&Message::new(serde_json::json!({"blocked": true}))));
    }

    #[test]
    fn string_equality() {
        let pred = compile_condition(r#"message.status == "done""#, Arc::new(VariableScope::default())).unwrap();
        assert!(pred(&Message::new(serde_json::json!({"status": "done"}))));
        assert!(!pred(&Message::new(serde_json::json!({"status": "pending"}))));
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = parse("true true").unwrap_err();
        assert!(matches!(err, ConditionError::TrailingInput(_)));
    }

    #[test]
    fn unclosed_paren_is_rejected() {
        assert!(parse("(true").is_err());
    }
}
