//! A small boolean expression language: `and`, `or`, `not` and parentheses
//! over opaque operands.
//!
//! Operands are typed values, never text to be re-parsed, so nothing an
//! operand contains can change the shape of the formula. Precedence is
//! `not` > `and` > `or`; `and`/`or` chains are flattened so long chains do
//! not deepen the tree.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::Serialize;
use thiserror::Error;

use crate::error::TargetError;

/// Maximum nesting of parentheses and `not`.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    And,
    Or,
    Not,
    Open,
    Close,
}

impl Op {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "and" => Some(Op::And),
            "or" => Some(Op::Or),
            "not" => Some(Op::Not),
            "(" => Some(Op::Open),
            ")" => Some(Op::Close),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
            Op::Open => "(",
            Op::Close => ")",
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Whether `word` is one of the boolean keywords or a parenthesis.
pub fn is_operator(word: &str) -> bool {
    Op::from_word(word).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<T> {
    Operand(T),
    Op(Op),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Expr<T> {
    Operand(T),
    Not(Box<Expr<T>>),
    And(Vec<Expr<T>>),
    Or(Vec<Expr<T>>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected '{token}' at position {position}")]
    Unexpected { token: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing ')' for '(' at position {0}")]
    Unclosed(usize),

    #[error("expression nested deeper than {0}")]
    TooDeep(usize),

    #[error("unknown token '{0}'")]
    UnknownToken(String),
}

impl From<ExprError> for TargetError {
    fn from(err: ExprError) -> Self {
        TargetError::InvalidExpression(err.to_string())
    }
}

impl<T> Expr<T> {
    /// Evaluate with `operand` deciding each leaf. `and`/`or` short-circuit
    /// left to right.
    pub fn eval<F>(&self, operand: &mut F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        match self {
            Expr::Operand(value) => operand(value),
            Expr::Not(inner) => !inner.eval(operand),
            Expr::And(items) => items.iter().all(|item| item.eval(operand)),
            Expr::Or(items) => items.iter().any(|item| item.eval(operand)),
        }
    }

    /// All operands, left to right.
    pub fn operands(&self) -> Vec<&T> {
        let mut out = Vec::new();
        self.collect_operands(&mut out);
        out
    }

    fn collect_operands<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Expr::Operand(value) => out.push(value),
            Expr::Not(inner) => inner.collect_operands(out),
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_operands(out);
                }
            }
        }
    }
}

/// Parse a token sequence into an expression tree.
pub fn parse<T>(tokens: Vec<Token<T>>) -> Result<Expr<T>, ExprError> {
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser {
        tokens: tokens.into_iter().map(Some).collect(),
        pos: 0,
    };
    let expr = parser.or_expr(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(parser.unexpected(token)),
    }
}

/// Evaluate a formula written only with `True`, `False`, `and`, `or`, `not`
/// and parentheses. Any other word is rejected.
pub fn evaluate_boolean_str(text: &str) -> Result<bool, ExprError> {
    let tokens = text
        .split_whitespace()
        .map(|word| match word {
            "True" => Ok(Token::Operand(true)),
            "False" => Ok(Token::Operand(false)),
            other => Op::from_word(other)
                .map(Token::Op)
                .ok_or_else(|| ExprError::UnknownToken(other.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parse(tokens)?.eval(&mut |value| *value))
}

struct Parser<T> {
    tokens: Vec<Option<Token<T>>>,
    pos: usize,
}

/// What the parser sees next, without the operand payload.
#[derive(Clone, Copy)]
enum Peek {
    Operand,
    Op(Op),
}

impl<T> Parser<T> {
    fn peek(&self) -> Option<Peek> {
        match self.tokens.get(self.pos)? {
            Some(Token::Operand(_)) => Some(Peek::Operand),
            Some(Token::Op(op)) => Some(Peek::Op(*op)),
            None => None,
        }
    }

    fn unexpected(&self, token: Peek) -> ExprError {
        let token = match token {
            Peek::Operand => "operand".to_string(),
            Peek::Op(op) => op.to_string(),
        };
        ExprError::Unexpected {
            token,
            position: self.pos,
        }
    }

    fn eat(&mut self, op: Op) -> bool {
        if matches!(self.peek(), Some(Peek::Op(next)) if next == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self, depth: usize) -> Result<Expr<T>, ExprError> {
        let mut items = vec![self.and_expr(depth)?];
        while self.eat(Op::Or) {
            items.push(self.and_expr(depth)?);
        }
        Ok(flatten(items, Expr::Or))
    }

    fn and_expr(&mut self, depth: usize) -> Result<Expr<T>, ExprError> {
        let mut items = vec![self.unary(depth)?];
        while self.eat(Op::And) {
            items.push(self.unary(depth)?);
        }
        Ok(flatten(items, Expr::And))
    }

    fn unary(&mut self, depth: usize) -> Result<Expr<T>, ExprError> {
        if depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        match self.peek() {
            None => Err(ExprError::UnexpectedEnd),
            Some(Peek::Op(Op::Not)) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary(depth + 1)?)))
            }
            Some(Peek::Op(Op::Open)) => {
                let open_at = self.pos;
                self.pos += 1;
                let inner = self.or_expr(depth + 1)?;
                if self.eat(Op::Close) {
                    Ok(inner)
                } else {
                    match self.peek() {
                        None => Err(ExprError::Unclosed(open_at)),
                        Some(token) => Err(self.unexpected(token)),
                    }
                }
            }
            Some(Peek::Operand) => {
                let slot = self.tokens.get_mut(self.pos).and_then(Option::take);
                self.pos += 1;
                match slot {
                    Some(Token::Operand(value)) => Ok(Expr::Operand(value)),
                    _ => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(token) => Err(self.unexpected(token)),
        }
    }
}

fn flatten<T>(mut items: Vec<Expr<T>>, wrap: fn(Vec<Expr<T>>) -> Expr<T>) -> Expr<T> {
    if items.len() == 1 {
        if let Some(only) = items.pop() {
            return only;
        }
    }
    wrap(items)
}
