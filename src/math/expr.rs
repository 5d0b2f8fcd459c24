//! Algebraic model expressions.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | 'x' | 'pi' | '[' index ']' | ident | ident '(' args ')' | '(' expr ')'
//! ```
//!
//! `^` is right-associative and binds tighter than unary minus, so `-x^2`
//! is `-(x^2)`. Parameters are either named identifiers (`tau`) or indexed
//! (`[1]`); both are bound to positions in the model's parameter list by
//! [`Expr::bind`].

use std::collections::BTreeSet;

use crate::error::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Exp,
    Log,
    Log10,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Pow,
    Min,
    Max,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Func::Exp,
            "log" | "ln" => Func::Log,
            "log10" => Func::Log10,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Expression tree.
///
/// Freshly parsed trees contain `Named`/`Indexed` leaves; after [`Expr::bind`]
/// every parameter is a `Param(position)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    X,
    Named(String),
    Indexed(usize),
    Param(usize),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Parse an expression string.
    pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser { tokens, pos: 0, len: src.len() };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(ExpressionError::at(tok.offset, format!("unexpected {}", tok.kind.describe())));
        }
        Ok(expr)
    }

    /// Resolve every parameter reference against `names`.
    ///
    /// Fails on unknown names, out-of-range indices, and on any parameter in
    /// `names` the expression never references.
    pub fn bind(&self, names: &[String]) -> Result<Expr, ExpressionError> {
        let bound = self.bind_inner(names)?;
        let mut used = BTreeSet::new();
        bound.collect_params(&mut used);
        if used.len() != names.len() {
            let unused: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, _)| !used.contains(i))
                .map(|(_, n)| n.as_str())
                .collect();
            return Err(ExpressionError::new(format!(
                "expression uses {} parameter(s) but {} name(s) were given (unused: {})",
                used.len(),
                names.len(),
                unused.join(", ")
            )));
        }
        Ok(bound)
    }

    fn bind_inner(&self, names: &[String]) -> Result<Expr, ExpressionError> {
        Ok(match self {
            Expr::Named(name) => match names.iter().position(|n| n == name) {
                Some(i) => Expr::Param(i),
                None => {
                    return Err(ExpressionError::new(format!(
                        "symbol '{name}' is not a declared parameter"
                    )));
                }
            },
            Expr::Indexed(i) => {
                if *i >= names.len() {
                    return Err(ExpressionError::new(format!(
                        "parameter [{i}] is out of range for {} declared parameter(s)",
                        names.len()
                    )));
                }
                Expr::Param(*i)
            }
            Expr::Num(_) | Expr::X | Expr::Param(_) => self.clone(),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.bind_inner(names)?)),
            Expr::Bin(op, a, b) => Expr::Bin(
                *op,
                Box::new(a.bind_inner(names)?),
                Box::new(b.bind_inner(names)?),
            ),
            Expr::Call(f, args) => Expr::Call(
                *f,
                args.iter()
                    .map(|a| a.bind_inner(names))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }

    fn collect_params(&self, out: &mut BTreeSet<usize>) {
        self.walk(&mut |e| {
            if let Expr::Param(i) = e {
                out.insert(*i);
            }
        });
    }

    fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Neg(inner) => inner.walk(f),
            Expr::Bin(_, a, b) => {
                a.walk(f);
                b.walk(f);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.walk(f)),
            _ => {}
        }
    }

    /// Evaluate a bound tree.
    ///
    /// Unbound leaves evaluate to NaN; callers only evaluate trees returned by
    /// [`Expr::bind`].
    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::X => x,
            Expr::Param(i) => params.get(*i).copied().unwrap_or(f64::NAN),
            Expr::Named(_) | Expr::Indexed(_) => f64::NAN,
            Expr::Neg(inner) => -inner.eval(x, params),
            Expr::Bin(op, a, b) => {
                let a = a.eval(x, params);
                let b = b.eval(x, params);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, args) => {
                let a = args[0].eval(x, params);
                match func {
                    Func::Exp => a.exp(),
                    Func::Log => a.ln(),
                    Func::Log10 => a.log10(),
                    Func::Sqrt => a.sqrt(),
                    Func::Abs => a.abs(),
                    Func::Sin => a.sin(),
                    Func::Cos => a.cos(),
                    Func::Tan => a.tan(),
                    Func::Pow => a.powf(args[1].eval(x, params)),
                    Func::Min => a.min(args[1].eval(x, params)),
                    Func::Max => a.max(args[1].eval(x, params)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Num(v) => format!("number {v}"),
            TokenKind::Ident(s) => format!("identifier '{s}'"),
            TokenKind::Op(c) => format!("operator '{c}'"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Comma => "','".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExpressionError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        if c.is_ascii_digit() || (c == '.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            // Exponent part: only consumed when followed by digits, so `2e` stays an error.
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let text = &src[start..i];
            let value: f64 = text
                .parse()
                .map_err(|_| ExpressionError::at(start, format!("malformed number '{text}'")))?;
            out.push(Token { kind: TokenKind::Num(value), offset: start });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push(Token {
                kind: TokenKind::Ident(src[start..i].to_string()),
                offset: start,
            });
            continue;
        }

        let kind = match c {
            '+' | '-' | '*' | '/' | '^' => TokenKind::Op(c),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            _ => return Err(ExpressionError::at(start, format!("unexpected character '{c}'"))),
        };
        out.push(Token { kind, offset: start });
        i += 1;
    }

    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token { kind: TokenKind::Op(c), .. }) if ops.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        match self.next() {
            Some(tok) if tok.kind == kind => Ok(()),
            Some(tok) => Err(ExpressionError::at(
                tok.offset,
                format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            )),
            None => Err(ExpressionError::at(
                self.len,
                format!("expected {}, found end of expression", kind.describe()),
            )),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            let op = if op == '+' { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/']) {
            let rhs = self.unary()?;
            let op = if op == '*' { BinOp::Mul } else { BinOp::Div };
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.eat_op(&['-', '+']) {
            Some('-') => Ok(Expr::Neg(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let Some(tok) = self.next() else {
            return Err(ExpressionError::at(self.len, "unexpected end of expression"));
        };

        match tok.kind {
            TokenKind::Num(v) => Ok(Expr::Num(v)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let idx = match self.next() {
                    Some(Token { kind: TokenKind::Num(v), .. })
                        if v >= 0.0 && v.fract() == 0.0 && v < 1e6 =>
                    {
                        v as usize
                    }
                    Some(other) => {
                        return Err(ExpressionError::at(
                            other.offset,
                            "parameter index must be a non-negative integer",
                        ));
                    }
                    None => return Err(ExpressionError::at(self.len, "unterminated parameter index")),
                };
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Indexed(idx))
            }
            TokenKind::Ident(name) => {
                let is_call = matches!(self.peek(), Some(Token { kind: TokenKind::LParen, .. }));
                if is_call {
                    let func = Func::from_name(&name).ok_or_else(|| {
                        ExpressionError::at(tok.offset, format!("unknown function '{name}'"))
                    })?;
                    self.pos += 1;
                    let mut args = vec![self.expr()?];
                    while matches!(self.peek(), Some(Token { kind: TokenKind::Comma, .. })) {
                        self.pos += 1;
                        args.push(self.expr()?);
                    }
                    self.expect(TokenKind::RParen)?;
                    if args.len() != func.arity() {
                        return Err(ExpressionError::at(
                            tok.offset,
                            format!("'{name}' takes {} argument(s), got {}", func.arity(), args.len()),
                        ));
                    }
                    return Ok(Expr::Call(func, args));
                }
                match name.as_str() {
                    "x" => Ok(Expr::X),
                    "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                    _ => Ok(Expr::Named(name)),
                }
            }
            other => Err(ExpressionError::at(tok.offset, format!("unexpected {}", other.describe()))),
        }
    }
}
