//! Route rule expressions.
//!
//! A rule like `${user_id}.toLong().intdiv(100) % 100` is compiled once
//! into a small AST when the rule is created and evaluated against the
//! shard column values extracted from each query. Evaluation is pure:
//! the same expression and values always produce the same index.
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | postfix
//! postfix := primary ('.' method '(' [expr (',' expr)*] ')')*
//! primary := integer | string | '${' column '}' | '(' expr ')'
//! ```
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::Error;
use crate::value::Value;

/// Shard column values extracted from a query, by column name.
pub type ShardValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Var(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    Comma,
    LParen,
    RParen,
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut tokens = vec![];
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            c if c.is_whitespace() => pos += 1,

            '$' => {
                if chars.get(pos + 1) != Some(&'{') {
                    return Err(format!("expected '{{' after '$' at {}", pos));
                }
                let start = pos + 2;
                let end = chars[start..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| start + offset)
                    .ok_or_else(|| "unterminated ${...} placeholder".to_string())?;
                let name = chars[start..end].iter().collect::<String>();
                let name = name.trim();
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(format!("invalid column name \"{}\"", name));
                }
                tokens.push(Token::Var(name.to_owned()));
                pos = end + 1;
            }

            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                pos += 1;
                loop {
                    match chars.get(pos) {
                        None => return Err("unterminated string literal".into()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(pos + 1) {
                                value.push(*escaped);
                            }
                            pos += 2;
                        }
                        Some(c) if *c == quote => {
                            pos += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(*c);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }

            c if c.is_ascii_digit() => {
                let start = pos;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let digits = chars[start..pos].iter().collect::<String>();
                // Groovy long suffix.
                if matches!(chars.get(pos), Some('L') | Some('l')) {
                    pos += 1;
                }
                let int = digits
                    .parse::<i64>()
                    .map_err(|_| format!("integer literal {} is out of range", digits))?;
                tokens.push(Token::Int(int));
            }

            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }

            _ => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '.' => Token::Dot,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    c => return Err(format!("unexpected character '{}' at {}", c, pos)),
                });
                pos += 1;
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Method {
    ToLong,
    IntDiv,
    Abs,
    ToString,
    Length,
    Substring,
    HashCode,
}

impl Method {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "toLong" | "toInteger" => Self::ToLong,
            "intdiv" => Self::IntDiv,
            "abs" => Self::Abs,
            "toString" => Self::ToString,
            "length" => Self::Length,
            "substring" => Self::Substring,
            "hashCode" => Self::HashCode,
            _ => return None,
        })
    }

    fn arity(&self) -> std::ops::RangeInclusive<usize> {
        match self {
            Self::IntDiv => 1..=1,
            Self::Substring => 1..=2,
            _ => 0..=0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Int(i64),
    Str(String),
    // Index into the expression's column list.
    Column(usize),
    Neg(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
    Call(Method, Box<Node>, Vec<Node>),
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    columns: Vec<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if *token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, got {:?}", expected, token)),
            None => Err(format!("expected {:?}, got end of expression", expected)),
        }
    }

    fn expr(&mut self) -> Result<Node, String> {
        let mut node = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(node),
            };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Node, String> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                Some(Token::Percent) => Op::Rem,
                _ => return Ok(node),
            };
            self.pos += 1;
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Node, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Node, String> {
        let mut node = self.primary()?;

        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name.clone(),
                other => return Err(format!("expected method name, got {:?}", other)),
            };
            let method =
                Method::lookup(&name).ok_or_else(|| format!("unknown method \"{}\"", name))?;

            self.expect(Token::LParen)?;
            let mut args = vec![];
            if self.peek() != Some(&Token::RParen) {
                loop {
                    args.push(self.expr()?);
                    if self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RParen)?;

            if !method.arity().contains(&args.len()) {
                return Err(format!(
                    "method \"{}\" doesn't take {} argument(s)",
                    name,
                    args.len()
                ));
            }

            node = Node::Call(method, Box::new(node), args);
        }

        Ok(node)
    }

    fn primary(&mut self) -> Result<Node, String> {
        match self.next().cloned() {
            Some(Token::Int(int)) => Ok(Node::Int(int)),
            Some(Token::Str(string)) => Ok(Node::Str(string)),
            Some(Token::Var(name)) => {
                let index = match self.columns.iter().position(|c| *c == name) {
                    Some(index) => index,
                    None => {
                        self.columns.push(name);
                        self.columns.len() - 1
                    }
                };
                Ok(Node::Column(index))
            }
            Some(Token::LParen) => {
                let node = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(node)
            }
            Some(Token::Ident(name)) => Err(format!(
                "bare identifier \"{}\", shard columns are written as ${{{}}}",
                name, name
            )),
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of expression".into()),
        }
    }
}

/// Intermediate result of evaluation.
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Int(i64),
    Str(String),
}

impl Scalar {
    fn from_value(column: &str, value: &Value) -> Result<Self, Error> {
        match value {
            Value::Integer(int) => Ok(Self::Int(*int)),
            Value::Text(text) => Ok(Self::Str(text.clone())),
            Value::Bool(_) | Value::Float(_) => value.integer().map(Self::Int).ok_or_else(|| {
                Error::evaluation(format!("{} = {} is not an integer", column, value))
            }),
            Value::Null => Err(Error::evaluation(format!("{} is NULL", column))),
            Value::Bytes(bytes) => String::from_utf8(bytes.clone())
                .map(Self::Str)
                .map_err(|_| Error::evaluation(format!("{} is not valid UTF-8", column))),
        }
    }

    fn integer(&self) -> Result<i64, Error> {
        match self {
            Self::Int(int) => Ok(*int),
            Self::Str(text) => text
                .trim()
                .parse()
                .map_err(|_| Error::evaluation(format!("\"{}\" is not a number", text))),
        }
    }

    fn string(&self) -> String {
        match self {
            Self::Int(int) => int.to_string(),
            Self::Str(text) => text.clone(),
        }
    }
}

/// Java-style string hash, stable across runs and platforms.
fn hash_code(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

fn overflow() -> Error {
    Error::evaluation("integer overflow")
}

/// Compiled route rule expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    root: Node,
    columns: Vec<String>,
}

impl Expression {
    /// Compile expression text.
    pub fn compile(text: &str) -> Result<Self, Error> {
        let tokens = tokenize(text).map_err(|reason| Error::invalid_rule(text, reason))?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            columns: vec![],
        };
        let root = parser
            .expr()
            .map_err(|reason| Error::invalid_rule(text, reason))?;

        if let Some(token) = parser.peek() {
            return Err(Error::invalid_rule(
                text,
                format!("unexpected trailing {:?}", token),
            ));
        }

        Ok(Self {
            text: text.to_owned(),
            root,
            columns: parser.columns,
        })
    }

    /// Shard columns referenced by the expression, in order of appearance.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Original expression text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Evaluate the expression to an integer index.
    pub fn evaluate(&self, values: &ShardValues) -> Result<i64, Error> {
        self.eval(&self.root, values)?.integer()
    }

    fn eval(&self, node: &Node, values: &ShardValues) -> Result<Scalar, Error> {
        match node {
            Node::Int(int) => Ok(Scalar::Int(*int)),
            Node::Str(string) => Ok(Scalar::Str(string.clone())),

            Node::Column(index) => {
                let column = &self.columns[*index];
                let value = values.get(column).ok_or_else(|| {
                    Error::evaluation(format!("no value for shard column \"{}\"", column))
                })?;
                Scalar::from_value(column, value)
            }

            Node::Neg(inner) => {
                let int = self.eval(inner, values)?.integer()?;
                Ok(Scalar::Int(int.checked_neg().ok_or_else(overflow)?))
            }

            Node::Binary(op, left, right) => {
                let left = self.eval(left, values)?;
                let right = self.eval(right, values)?;

                if *op == Op::Add {
                    if let (Scalar::Int(l), Scalar::Int(r)) = (&left, &right) {
                        return Ok(Scalar::Int(l.checked_add(*r).ok_or_else(overflow)?));
                    }
                    return Ok(Scalar::Str(left.string() + &right.string()));
                }

                let (l, r) = (left.integer()?, right.integer()?);
                let result = match op {
                    Op::Sub => l.checked_sub(r),
                    Op::Mul => l.checked_mul(r),
                    Op::Div => {
                        if r == 0 {
                            return Err(Error::evaluation("division by zero"));
                        }
                        l.checked_div(r)
                    }
                    Op::Rem => {
                        if r == 0 {
                            return Err(Error::evaluation("division by zero"));
                        }
                        l.checked_rem_euclid(r)
                    }
                    Op::Add => unreachable!("handled above"),
                };

                Ok(Scalar::Int(result.ok_or_else(overflow)?))
            }

            Node::Call(method, target, args) => {
                let target = self.eval(target, values)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, values))
                    .collect::<Result<Vec<_>, _>>()?;

                match method {
                    Method::ToLong => Ok(Scalar::Int(target.integer()?)),
                    Method::IntDiv => {
                        let divisor = args[0].integer()?;
                        if divisor == 0 {
                            return Err(Error::evaluation("division by zero"));
                        }
                        Ok(Scalar::Int(
                            target
                                .integer()?
                                .checked_div(divisor)
                                .ok_or_else(overflow)?,
                        ))
                    }
                    Method::Abs => Ok(Scalar::Int(
                        target.integer()?.checked_abs().ok_or_else(overflow)?,
                    )),
                    Method::ToString => Ok(Scalar::Str(target.string())),
                    Method::Length => Ok(Scalar::Int(target.string().chars().count() as i64)),
                    Method::HashCode => Ok(Scalar::Int(hash_code(&target.string()) as i64)),
                    Method::Substring => {
                        let string = target.string().chars().collect::<Vec<_>>();
                        let begin = args[0].integer()?;
                        let end = match args.get(1) {
                            Some(end) => end.integer()?,
                            None => string.len() as i64,
                        };
                        if begin < 0 || end < begin || end as usize > string.len() {
                            return Err(Error::evaluation(format!(
                                "substring({}, {}) out of range for \"{}\"",
                                begin,
                                end,
                                target.string()
                            )));
                        }
                        Ok(Scalar::Str(
                            string[begin as usize..end as usize].iter().collect(),
                        ))
                    }
                }
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.text)
    }
}
