//! Calibration expressions in a single variable `x`.
//!
//! Only arithmetic, parentheses, the constants `pi` and `e`, and a fixed set of
//! functions are accepted. `**` is an alias for `^` so legacy configuration
//! files keep working.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid calibration at position {position}: {message}")]
pub struct CalibrationError {
    pub position: usize,
    pub message: String,
}

impl CalibrationError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log10,
    Min,
    Max,
    Round,
    Floor,
    Ceil,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Self::Abs),
            "sqrt" => Some(Self::Sqrt),
            "exp" => Some(Self::Exp),
            "ln" => Some(Self::Ln),
            "log10" => Some(Self::Log10),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "round" => Some(Self::Round),
            "floor" => Some(Self::Floor),
            "ceil" => Some(Self::Ceil),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::Min | Self::Max => 2,
            _ => 1,
        }
    }

    fn eval(self, args: &[f64]) -> f64 {
        match self {
            Self::Abs => args[0].abs(),
            Self::Sqrt => args[0].sqrt(),
            Self::Exp => args[0].exp(),
            Self::Ln => args[0].ln(),
            Self::Log10 => args[0].log10(),
            Self::Min => args[0].min(args[1]),
            Self::Max => args[0].max(args[1]),
            Self::Round => args[0].round(),
            Self::Floor => args[0].floor(),
            Self::Ceil => args[0].ceil(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Var,
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Var => x,
            Self::Neg(inner) => -inner.eval(x),
            Self::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(x), rhs.eval(x));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Self::Call(func, args) => {
                let values: Vec<f64> = args.iter().map(|arg| arg.eval(x)).collect();
                func.eval(&values)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    End,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, CalibrationError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;
        match c {
            b' ' | b'\t' => {
                pos += 1;
                continue;
            }
            b'+' => tokens.push((start, Token::Plus)),
            b'-' => tokens.push((start, Token::Minus)),
            b'/' => tokens.push((start, Token::Slash)),
            b'^' => tokens.push((start, Token::Caret)),
            b'(' => tokens.push((start, Token::LParen)),
            b')' => tokens.push((start, Token::RParen)),
            b',' => tokens.push((start, Token::Comma)),
            b'*' => {
                if bytes.get(pos + 1) == Some(&b'*') {
                    tokens.push((start, Token::Caret));
                    pos += 1;
                } else {
                    tokens.push((start, Token::Star));
                }
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut cursor = pos + 1;
                    if cursor < bytes.len() && (bytes[cursor] == b'+' || bytes[cursor] == b'-') {
                        cursor += 1;
                    }
                    if cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
                        pos = cursor;
                        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let text = &source[start..pos];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalibrationError::new(start, format!("bad number `{text}`")))?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                tokens.push((start, Token::Ident(source[start..pos].to_string())));
                continue;
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(CalibrationError::new(
                    start,
                    format!("unexpected character `{ch}`"),
                ));
            }
        }
        pos += 1;
    }

    tokens.push((source.len(), Token::End));
    Ok(tokens)
}

/// Longest accepted calibration source, in bytes.
pub const MAX_SOURCE_LEN: usize = 256;
/// Deepest accepted nesting of parentheses, calls and unary signs.
pub const MAX_DEPTH: usize = 32;

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn enter(&mut self, position: usize) -> Result<(), CalibrationError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalibrationError::new(position, "expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index].1
    }

    fn position(&self) -> usize {
        self.tokens[self.index].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].1.clone();
        if token != Token::End {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), CalibrationError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(CalibrationError::new(self.position(), format!("expected {what}")))
        }
    }

    fn expression(&mut self) -> Result<Expr, CalibrationError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, CalibrationError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, CalibrationError> {
        self.enter(self.position())?;
        let expr = self.signed();
        self.leave();
        expr
    }

    fn signed(&mut self) -> Result<Expr, CalibrationError> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Token::Plus => {
                self.advance();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, CalibrationError> {
        let base = self.atom()?;
        if *self.peek() == Token::Caret {
            self.advance();
            // right associative: 2^3^2 == 2^(3^2)
            let exponent = self.unary()?;
            return Ok(Expr::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, CalibrationError> {
        let position = self.position();
        match self.advance() {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::LParen => {
                self.enter(position)?;
                let inner = self.expression();
                self.leave();
                let inner = inner?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "x" => Ok(Expr::Var),
                "pi" => Ok(Expr::Number(std::f64::consts::PI)),
                "e" => Ok(Expr::Number(std::f64::consts::E)),
                _ => {
                    let func = Func::lookup(&name).ok_or_else(|| {
                        CalibrationError::new(position, format!("unknown name `{name}`"))
                    })?;
                    self.call(func, &name, position)
                }
            },
            Token::End => Err(CalibrationError::new(position, "unexpected end of input")),
            other => Err(CalibrationError::new(
                position,
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn call(&mut self, func: Func, name: &str, position: usize) -> Result<Expr, CalibrationError> {
        self.enter(position)?;
        let call = self.arguments(func, name, position);
        self.leave();
        call
    }

    fn arguments(
        &mut self,
        func: Func,
        name: &str,
        position: usize,
    ) -> Result<Expr, CalibrationError> {
        self.expect(Token::LParen, "`(` after function name")?;
        let mut args = vec![self.expression()?];
        while *self.peek() == Token::Comma {
            self.advance();
            args.push(self.expression()?);
        }
        self.expect(Token::RParen, "`)`")?;

        if args.len() != func.arity() {
            return Err(CalibrationError::new(
                position,
                format!(
                    "`{name}` takes {} argument(s), got {}",
                    func.arity(),
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call(func, args))
    }
}

/// A compiled calibration function `x -> f(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    source: String,
    expr: Expr,
}

impl Calibration {
    pub fn identity() -> Self {
        Self {
            source: "x".to_string(),
            expr: Expr::Var,
        }
    }

    /// `scale * x + offset`
    pub fn affine(scale: f64, offset: f64) -> Self {
        Self {
            source: format!("{scale}*x+{offset}"),
            expr: Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Number(scale)),
                    Box::new(Expr::Var),
                )),
                Box::new(Expr::Number(offset)),
            ),
        }
    }

    pub fn parse(source: &str) -> Result<Self, CalibrationError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(CalibrationError::new(0, "empty expression"));
        }
        if trimmed.len() > MAX_SOURCE_LEN {
            return Err(CalibrationError::new(
                MAX_SOURCE_LEN,
                format!("expression longer than {MAX_SOURCE_LEN} bytes"),
            ));
        }

        let mut parser = Parser {
            tokens: tokenize(trimmed)?,
            index: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        if *parser.peek() != Token::End {
            return Err(CalibrationError::new(
                parser.position(),
                "trailing input after expression",
            ));
        }

        Ok(Self {
            source: trimmed.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_identity(&self) -> bool {
        self.expr == Expr::Var
    }

    pub fn apply(&self, value: f32) -> f32 {
        self.expr.eval(f64::from(value)) as f32
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
