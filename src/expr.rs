//! Arithmetic expressions for user-defined calculated fields.
//!
//! The language is deliberately tiny: numeric literals, `+ - * /`, unary
//! sign, parentheses, and column references written as `[Column Name]`.
//! Expressions are tokenized and parsed by a recursive-descent parser into a
//! small tree, so nothing outside that grammar can ever run.
//!
//! [`evaluate`] never fails: malformed input, division by zero, or any other
//! non-finite result yields `0.0`. Callers that want to show a warning use
//! [`validate_expression`] or [`Expression::parse`] directly.

use anyhow::{Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{data::RawRow, numeric::normalize_numeric};

const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("Expression is empty")]
    Empty,
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("Column reference at position {position} is never closed")]
    UnterminatedColumn { position: usize },
    #[error("Empty column reference at position {position}")]
    EmptyColumn { position: usize },
    #[error("Invalid number literal '{literal}'")]
    InvalidNumber { literal: String },
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unexpected {token} at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("Expression nesting exceeds {0} levels")]
    TooDeep(usize),
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
    #[error("Expression produced a non-finite result")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Column(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Column(name) => format!("column [{name}]"),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0usize;
    while idx < chars.len() {
        let ch = chars[idx];
        let position = idx;
        let kind = match ch {
            c if c.is_whitespace() => {
                idx += 1;
                continue;
            }
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => {
                let close = chars[idx + 1..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or(ExprError::UnterminatedColumn { position })?;
                if close == 0 {
                    return Err(ExprError::EmptyColumn { position });
                }
                let name: String = chars[idx + 1..idx + 1 + close].iter().collect();
                idx += close + 2;
                tokens.push(Token {
                    kind: TokenKind::Column(name),
                    position,
                });
                continue;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = idx;
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let literal: String = chars[idx..end].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber {
                        literal: literal.clone(),
                    })?;
                idx = end;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position,
                });
                continue;
            }
            other => {
                return Err(ExprError::UnexpectedChar {
                    ch: other,
                    position,
                });
            }
        };
        tokens.push(Token { kind, position });
        idx += 1;
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Column(String),
    Negate(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.cursor).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.term()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    // unary := ('+' | '-') unary | primary
    fn unary(&mut self) -> Result<Node, ExprError> {
        match self.peek() {
            Some(TokenKind::Plus) => {
                self.cursor += 1;
                self.enter()?;
                let node = self.unary()?;
                self.depth -= 1;
                Ok(node)
            }
            Some(TokenKind::Minus) => {
                self.cursor += 1;
                self.enter()?;
                let node = self.unary()?;
                self.depth -= 1;
                Ok(Node::Negate(Box::new(node)))
            }
            _ => self.primary(),
        }
    }

    // primary := number | column | '(' expression ')'
    fn primary(&mut self) -> Result<Node, ExprError> {
        let token = self.advance().ok_or(ExprError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(n) => Ok(Node::Number(n)),
            TokenKind::Column(name) => Ok(Node::Column(name)),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.expression()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken {
                        token: other.kind.describe(),
                        position: other.position,
                    }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            other => Err(ExprError::UnexpectedToken {
                token: other.describe(),
                position: token.position,
            }),
        }
    }
}

fn eval_node(node: &Node, row: &RawRow) -> f64 {
    match node {
        Node::Number(n) => *n,
        Node::Column(name) => normalize_numeric(row.value(name)),
        Node::Negate(inner) => -eval_node(inner, row),
        Node::Binary { op, lhs, rhs } => {
            let left = eval_node(lhs, row);
            let right = eval_node(rhs, row);
            match op {
                BinaryOp::Add => left + right,
                BinaryOp::Sub => left - right,
                BinaryOp::Mul => left * right,
                BinaryOp::Div => left / right,
            }
        }
    }
}

fn collect_columns<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    match node {
        Node::Number(_) => {}
        Node::Column(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Node::Negate(inner) => collect_columns(inner, out),
        Node::Binary { lhs, rhs, .. } => {
            collect_columns(lhs, out);
            collect_columns(rhs, out);
        }
    }
}

/// A parsed expression that can be evaluated against many rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
        };
        let root = parser.expression()?;
        if let Some(extra) = parser.advance() {
            return Err(ExprError::UnexpectedToken {
                token: extra.kind.describe(),
                position: extra.position,
            });
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced by the expression, in first-use order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_columns(&self.root, &mut out);
        out
    }

    /// Missing columns contribute `0`; only a non-finite result is an error.
    pub fn eval(&self, row: &RawRow) -> Result<f64, ExprError> {
        let value = eval_node(&self.root, row);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NonFinite)
        }
    }

    pub fn eval_or_zero(&self, row: &RawRow) -> f64 {
        self.eval(row).unwrap_or(0.0)
    }
}

pub fn evaluate(expression: &str, row: &RawRow) -> f64 {
    match Expression::parse(expression) {
        Ok(parsed) => parsed.eval_or_zero(row),
        Err(err) => {
            debug!("Rejecting expression '{expression}': {err}");
            0.0
        }
    }
}

/// Checks structure and that every referenced column exists in `columns`.
pub fn validate_expression(expression: &str, columns: &[String]) -> Result<(), ExprError> {
    let parsed = Expression::parse(expression)?;
    if let Some(unknown) = parsed
        .columns()
        .into_iter()
        .find(|name| !columns.iter().any(|c| c == name))
    {
        return Err(ExprError::UnknownColumn(unknown.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Numeric,
    String,
}

/// A user-defined virtual column, e.g. `Net = [Revenue] - [Cost]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedField {
    pub id: String,
    pub name: String,
    pub expression: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CalculatedField {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            id: format!("calc_{}", Uuid::new_v4().simple()),
            name: name.into(),
            expression: expression.into(),
            field_type: FieldType::Numeric,
            description: None,
        }
    }

    /// Parses a `name=expression` specification.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.splitn(2, '=');
        let name = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Calculated field is missing a name"))?;
        let expression = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Calculated field '{name}' is missing an expression"))?;
        Expression::parse(expression)
            .map_err(|err| anyhow!("Calculated field '{name}' is invalid: {err}"))?;
        Ok(Self::new(name, expression))
    }

    pub fn compile(&self) -> Option<Expression> {
        Expression::parse(&self.expression).ok()
    }
}

pub fn parse_calculated_fields(specs: &[String]) -> Result<Vec<CalculatedField>> {
    specs.iter().map(|spec| CalculatedField::parse(spec)).collect()
}
