//! Expression language of the built-in interpreter.
//!
//! A small Python-like language: literals, names, attribute and item access,
//! tuples, lists and dicts, arithmetic, comparisons, boolean operators,
//! conditional expressions and a handful of builtins.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Value;

use super::Context;

/// Name lookup during evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for Context {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

const KEYWORDS: [&str; 10] = [
    "and", "or", "not", "in", "is", "if", "else", "True", "False", "None",
];

const OPERATORS: [&str; 22] = [
    "**", "//", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "(", ")", "[", "]",
    "{", "}", ",", ":", ".",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    End,
}

fn syntax(src: &str, message: impl std::fmt::Display) -> Error {
    Error::Expression(format!("invalid expression '{src}': {message}"))
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let digit_at = |i: usize| chars.get(i).is_some_and(char::is_ascii_digit);
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && digit_at(i + 1)) {
            let start = i;
            let mut float = false;
            while digit_at(i) || chars.get(i) == Some(&'_') {
                i += 1;
            }
            if chars.get(i) == Some(&'.') && digit_at(i + 1) {
                float = true;
                i += 1;
                while digit_at(i) {
                    i += 1;
                }
            }
            if matches!(chars.get(i), Some('e' | 'E')) {
                let mut j = i + 1;
                if matches!(chars.get(j), Some('+' | '-')) {
                    j += 1;
                }
                if digit_at(j) {
                    float = true;
                    i = j;
                    while digit_at(i) {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().filter(|&&c| c != '_').collect();
            let token = if float {
                text.parse().map(Token::Float).map_err(|e| syntax(src, e))?
            } else {
                text.parse().map(Token::Int).map_err(|e| syntax(src, e))?
            };
            tokens.push(token);
        } else if c == '\'' || c == '"' {
            i += 1;
            let mut text = String::new();
            loop {
                match chars.get(i) {
                    None => return Err(syntax(src, "unterminated string")),
                    Some(&q) if q == c => break,
                    Some('\\') => {
                        let escaped = match chars.get(i + 1) {
                            Some('n') => '\n',
                            Some('t') => '\t',
                            Some('r') => '\r',
                            Some('0') => '\0',
                            Some(&other) => other,
                            None => return Err(syntax(src, "unterminated string")),
                        };
                        text.push(escaped);
                        i += 2;
                    }
                    Some(&other) => {
                        text.push(other);
                        i += 1;
                    }
                }
            }
            i += 1;
            tokens.push(Token::Str(text));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while chars.get(i).is_some_and(|&c| c.is_alphanumeric() || c == '_') {
                i += 1;
            }
            tokens.push(Token::Name(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(*op))
                .ok_or_else(|| syntax(src, format!("unexpected character '{c}'")))?;
            i += op.chars().count();
            tokens.push(Token::Op(*op));
        }
    }
    tokens.push(Token::End);
    Ok(tokens)
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        let found = self.at_op(op);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        let found = self.at_keyword(kw);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{op}'")))
        }
    }

    fn unexpected(&self, context: &str) -> Error {
        let found = match self.peek() {
            Token::End => "end of expression".to_string(),
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Name(n) => n.clone(),
            Token::Op(op) => (*op).to_string(),
        };
        syntax(self.src, format!("{context}, found {found}"))
    }

    /// Comma-separated expressions; more than one, or a trailing comma,
    /// makes a tuple.
    fn expr_list(&mut self, closers: &[&str]) -> Result<Expr> {
        let first = self.conditional()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if matches!(self.peek(), Token::End) || closers.iter().any(|c| self.at_op(c)) {
                break;
            }
            items.push(self.conditional()?);
        }
        Ok(Expr::List(items))
    }

    fn conditional(&mut self) -> Result<Expr> {
        let then = self.or_test()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let test = self.or_test()?;
        if !self.eat_keyword("else") {
            return Err(self.unexpected("expected 'else'"));
        }
        let otherwise = self.conditional()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_test(&mut self) -> Result<Expr> {
        let mut left = self.and_test()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and_test()?));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr> {
        let mut left = self.not_test()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not_test()?));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_test()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let op = if self.eat_op("==") {
                CmpOp::Eq
            } else if self.eat_op("!=") {
                CmpOp::Ne
            } else if self.eat_op("<=") {
                CmpOp::Le
            } else if self.eat_op(">=") {
                CmpOp::Ge
            } else if self.eat_op("<") {
                CmpOp::Lt
            } else if self.eat_op(">") {
                CmpOp::Gt
            } else if self.eat_keyword("in") {
                CmpOp::In
            } else if self.at_keyword("not")
                && matches!(self.tokens.get(self.pos + 1), Some(Token::Name(n)) if n == "in")
            {
                self.pos += 2;
                CmpOp::NotIn
            } else if self.eat_keyword("is") {
                if self.eat_keyword("not") {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            } else {
                break;
            };
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_op("+") {
                BinOp::Add
            } else if self.eat_op("-") {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = if self.eat_op("*") {
                BinOp::Mul
            } else if self.eat_op("//") {
                BinOp::FloorDiv
            } else if self.eat_op("/") {
                BinOp::Div
            } else if self.eat_op("%") {
                BinOp::Mod
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.factor()?));
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            return Ok(Expr::Neg(Box::new(self.factor()?)));
        }
        if self.eat_op("+") {
            return self.factor();
        }
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exp = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_op(".") {
                match self.advance() {
                    Token::Name(name) => expr = Expr::Attr(Box::new(expr), name),
                    _ => return Err(syntax(self.src, "expected attribute name after '.'")),
                }
            } else if self.eat_op("[") {
                let index = self.expr_list(&["]"])?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_op("(") {
                let mut args = Vec::new();
                while !self.at_op(")") {
                    args.push(self.conditional()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(mut s) => {
                // adjacent literals concatenate
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                "None" => Ok(Expr::Literal(Value::None)),
                kw if KEYWORDS.contains(&kw) => {
                    self.pos -= 1;
                    Err(self.unexpected("expected a value"))
                }
                _ => Ok(Expr::Name(name.clone())),
            },
            Token::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let inner = self.expr_list(&[")"])?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => {
                let mut items = Vec::new();
                while !self.at_op("]") {
                    items.push(self.conditional()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Token::Op("{") => {
                let mut entries = Vec::new();
                while !self.at_op("}") {
                    let key = self.conditional()?;
                    self.expect_op(":")?;
                    entries.push((key, self.conditional()?));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("}")?;
                Ok(Expr::Dict(entries))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expected a value"))
            }
        }
    }
}

impl Expr {
    pub fn parse(src: &str) -> Result<Self> {
        if src.trim().is_empty() {
            return Err(syntax(src, "empty expression"));
        }
        let mut parser = Parser {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        };
        let expr = parser.expr_list(&[])?;
        if !matches!(parser.peek(), Token::End) {
            return Err(parser.unexpected("unexpected trailing input"));
        }
        Ok(expr)
    }

    pub fn eval(&self, scope: &dyn Scope) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name(name) => scope
                .lookup(name)
                .ok_or_else(|| Error::Expression(format!("name '{name}' is not defined"))),
            Expr::Attr(obj, name) => obj.eval(scope)?.attr(name),
            Expr::Index(obj, key) => obj.eval(scope)?.index(&key.eval(scope)?),
            Expr::Call(callee, args) => {
                let args = args
                    .iter()
                    .map(|a| a.eval(scope))
                    .collect::<Result<Vec<_>>>()?;
                match callee.as_ref() {
                    Expr::Name(name) if scope.lookup(name).is_none() => call_builtin(name, args),
                    Expr::Attr(obj, method) => call_method(obj.eval(scope)?, method, args),
                    other => Err(Error::Expression(format!(
                        "'{}' object is not callable",
                        other.eval(scope)?.type_name()
                    ))),
                }
            }
            Expr::List(items) => items
                .iter()
                .map(|i| i.eval(scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expr::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (k, v) in entries {
                    map.insert(k.eval(scope)?.to_text(), v.eval(scope)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(scope)?.truthy())),
            Expr::Neg(inner) => match inner.eval(scope)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Error::Expression("integer overflow".into())),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
                Value::Duration(d) => Ok(Value::Duration(-d)),
                other => Err(Error::Expression(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
            Expr::And(a, b) => {
                let left = a.eval(scope)?;
                if left.truthy() { b.eval(scope) } else { Ok(left) }
            }
            Expr::Or(a, b) => {
                let left = a.eval(scope)?;
                if left.truthy() { Ok(left) } else { b.eval(scope) }
            }
            Expr::Binary(op, a, b) => binary(*op, a.eval(scope)?, b.eval(scope)?),
            Expr::Compare(first, rest) => {
                let mut left = first.eval(scope)?;
                for (op, right) in rest {
                    let right = right.eval(scope)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if test.eval(scope)?.truthy() {
                    then.eval(scope)
                } else {
                    otherwise.eval(scope)
                }
            }
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(src: &str, scope: &dyn Scope) -> Result<Value> {
    Expr::parse(src)?.eval(scope)
}

fn type_error(op: &str, a: &Value, b: &Value) -> Error {
    Error::Expression(format!(
        "unsupported operand types for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn overflow() -> Error {
    Error::Expression("integer overflow".into())
}

fn int_operands(a: &Value, b: &Value) -> Option<(i64, i64)> {
    let as_int = |v: &Value| match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    };
    Some((as_int(a)?, as_int(b)?))
}

fn binary(op: BinOp, a: Value, b: Value) -> Result<Value> {
    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    };

    match (op, &a, &b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => return Ok(Value::Str(format!("{x}{y}"))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            return Ok(Value::List(x.iter().chain(y).cloned().collect()));
        }
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            return Ok(Value::Str(s.repeat(usize::try_from(*n).unwrap_or(0))));
        }
        (BinOp::Mul, Value::List(l), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::List(l)) => {
            let n = usize::try_from(*n).unwrap_or(0);
            return Ok(Value::List(
                std::iter::repeat_n(l.iter(), n).flatten().cloned().collect(),
            ));
        }
        (BinOp::Add, Value::Date(d), Value::Duration(t))
        | (BinOp::Add, Value::Duration(t), Value::Date(d)) => {
            return d
                .checked_add_signed(*t)
                .map(Value::Date)
                .ok_or_else(overflow);
        }
        (BinOp::Sub, Value::Date(d), Value::Duration(t)) => {
            return d
                .checked_sub_signed(*t)
                .map(Value::Date)
                .ok_or_else(overflow);
        }
        (BinOp::Sub, Value::Date(x), Value::Date(y)) => {
            return Ok(Value::Duration(x.signed_duration_since(*y)));
        }
        (BinOp::Add, Value::DateTime(d), Value::Duration(t))
        | (BinOp::Add, Value::Duration(t), Value::DateTime(d)) => {
            return d
                .checked_add_signed(*t)
                .map(Value::DateTime)
                .ok_or_else(overflow);
        }
        (BinOp::Sub, Value::DateTime(d), Value::Duration(t)) => {
            return d
                .checked_sub_signed(*t)
                .map(Value::DateTime)
                .ok_or_else(overflow);
        }
        (BinOp::Sub, Value::DateTime(x), Value::DateTime(y)) => {
            return Ok(Value::Duration(x.signed_duration_since(*y)));
        }
        (BinOp::Add, Value::Duration(x), Value::Duration(y)) => {
            return x.checked_add(y).map(Value::Duration).ok_or_else(overflow);
        }
        (BinOp::Sub, Value::Duration(x), Value::Duration(y)) => {
            return x.checked_sub(y).map(Value::Duration).ok_or_else(overflow);
        }
        _ => {}
    }

    if let Some((x, y)) = int_operands(&a, &b) {
        let zero = || Error::Expression("division by zero".into());
        return match op {
            BinOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Div if y == 0 => Err(zero()),
            BinOp::Div => Ok(Value::Float(x as f64 / y as f64)),
            BinOp::FloorDiv if y == 0 => Err(zero()),
            BinOp::FloorDiv => {
                let q = x.checked_div(y).ok_or_else(overflow)?;
                let inexact = x % y != 0 && ((x < 0) != (y < 0));
                Ok(Value::Int(q - i64::from(inexact)))
            }
            BinOp::Mod if y == 0 => Err(zero()),
            BinOp::Mod => {
                let r = x.checked_rem(y).ok_or_else(overflow)?;
                let r = if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r };
                Ok(Value::Int(r))
            }
            BinOp::Pow if y < 0 => Ok(Value::Float((x as f64).powf(y as f64))),
            BinOp::Pow => u32::try_from(y)
                .ok()
                .and_then(|y| x.checked_pow(y))
                .map(Value::Int)
                .ok_or_else(overflow),
        };
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(type_error(symbol, &a, &b));
    };
    let zero = || Error::Expression("float division by zero".into());
    match op {
        BinOp::Add => Ok(Value::Float(x + y)),
        BinOp::Sub => Ok(Value::Float(x - y)),
        BinOp::Mul => Ok(Value::Float(x * y)),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if y == 0.0 => Err(zero()),
        BinOp::Div => Ok(Value::Float(x / y)),
        BinOp::FloorDiv => Ok(Value::Float((x / y).floor())),
        BinOp::Mod => Ok(Value::Float(x - y * (x / y).floor())),
        BinOp::Pow => Ok(Value::Float(x.powf(y))),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::List(items) => Ok(items.contains(item)),
        Value::Map(map) => Ok(matches!(item, Value::Str(k) if map.contains_key(k))),
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(Error::Expression(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(Error::Expression(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => false,
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
    let ordered = |symbol: &str, test: fn(Ordering) -> bool| {
        a.partial_cmp(b).map(test).ok_or_else(|| {
            Error::Expression(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))
        })
    };
    match op {
        CmpOp::Eq => Ok(a == b),
        CmpOp::Ne => Ok(a != b),
        CmpOp::Lt => ordered("<", Ordering::is_lt),
        CmpOp::Le => ordered("<=", Ordering::is_le),
        CmpOp::Gt => ordered(">", Ordering::is_gt),
        CmpOp::Ge => ordered(">=", Ordering::is_ge),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|found| !found),
        CmpOp::Is => Ok(identical(a, b)),
        CmpOp::IsNot => Ok(!identical(a, b)),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(Error::Expression(format!(
            "{name}() takes {min} to {max} arguments ({} given)",
            args.len()
        )))
    }
}

fn int_arg(name: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(Error::Expression(format!(
            "{name}() expects integers, not '{}'",
            other.type_name()
        ))),
    }
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> Result<Value> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => {
                    return Err(Error::Expression(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::from(len))
        }
        "list" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => v.items().map(Value::List),
                None => Ok(Value::List(Vec::new())),
            }
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(Value::to_text).unwrap_or_default()))
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        "int" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    Error::Expression(format!("invalid literal for int(): '{s}'"))
                }),
                other => Err(Error::Expression(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        "float" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                    Error::Expression(format!("could not convert string to float: '{s}'"))
                }),
                other => other.as_f64().map(Value::Float).ok_or_else(|| {
                    Error::Expression(format!(
                        "float() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))
                }),
            }
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Duration(d) => Ok(Value::Duration(d.abs())),
                other => Err(Error::Expression(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "range" => {
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| int_arg(name, a))
                .collect::<Result<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step, ..] => (*start, *stop, *step),
                [] => (0, 0, 1),
            };
            if step == 0 {
                return Err(Error::Expression("range() arg 3 must not be zero".into()));
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                out.push(Value::Int(i));
                i = match i.checked_add(step) {
                    Some(next) => next,
                    None => break,
                };
            }
            Ok(Value::List(out))
        }
        "enumerate" => {
            arity(name, &args, 1, 2)?;
            let start = args.get(1).map(|v| int_arg(name, v)).transpose()?.unwrap_or(0);
            let items = args[0].items()?;
            Ok(Value::List(
                items
                    .into_iter()
                    .zip(start..)
                    .map(|(item, i)| Value::List(vec![Value::Int(i), item]))
                    .collect(),
            ))
        }
        "min" | "max" | "sum" => {
            let items = if args.len() == 1 {
                args.remove(0).items()?
            } else {
                args
            };
            if name == "sum" {
                return items.into_iter().try_fold(Value::Int(0), |acc, v| {
                    binary(BinOp::Add, acc, v)
                });
            }
            let mut best: Option<Value> = None;
            for item in items {
                let replace = match &best {
                    None => true,
                    Some(current) => {
                        let op = if name == "min" { CmpOp::Lt } else { CmpOp::Gt };
                        compare(op, &item, current)?
                    }
                };
                if replace {
                    best = Some(item);
                }
            }
            best.ok_or_else(|| Error::Expression(format!("{name}() arg is an empty sequence")))
        }
        _ => Err(Error::Expression(format!("name '{name}' is not defined"))),
    }
}

fn call_method(obj: Value, method: &str, args: Vec<Value>) -> Result<Value> {
    let no_method = |obj: &Value| {
        Error::Expression(format!(
            "'{}' object has no attribute '{method}'",
            obj.type_name()
        ))
    };
    match (&obj, method) {
        (Value::Map(map), "items") => Ok(Value::List(
            map.iter()
                .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                .collect(),
        )),
        (Value::Map(map), "keys") => Ok(Value::List(
            map.keys().map(|k| Value::Str(k.clone())).collect(),
        )),
        (Value::Map(map), "values") => Ok(Value::List(map.values().cloned().collect())),
        (Value::Map(map), "get") => {
            arity(method, &args, 1, 2)?;
            let found = map.get(&args[0].to_text()).cloned();
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or_default())
        }
        (Value::Str(s), "upper") => Ok(Value::Str(s.to_uppercase())),
        (Value::Str(s), "lower") => Ok(Value::Str(s.to_lowercase())),
        (Value::Str(s), "strip") => Ok(Value::Str(s.trim().to_string())),
        (Value::Str(s), "startswith") => {
            arity(method, &args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(args[0].to_text().as_str())))
        }
        (Value::Str(s), "endswith") => {
            arity(method, &args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(args[0].to_text().as_str())))
        }
        (Value::Str(s), "replace") => {
            arity(method, &args, 2, 2)?;
            Ok(Value::Str(s.replace(
                args[0].to_text().as_str(),
                args[1].to_text().as_str(),
            )))
        }
        (Value::Str(s), "join") => {
            arity(method, &args, 1, 1)?;
            let parts: Vec<String> = args[0].items()?.iter().map(Value::to_text).collect();
            Ok(Value::Str(parts.join(s)))
        }
        _ => Err(no_method(&obj)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};

    use super::*;

    fn ctx() -> Context {
        let mut ctx = Context::new();
        ctx.insert("n", 7).unwrap();
        ctx.insert("items", vec![1, 2, 3]).unwrap();
        ctx.insert(
            "o",
            Value::map([("name", Value::from("Ada")), ("qty", Value::from(2))]),
        )
        .unwrap();
        ctx
    }

    fn eval(src: &str) -> Value {
        evaluate(src, &ctx()).unwrap()
    }

    #[test]
    fn test_literals_and_names() {
        assert_eq!(eval("42"), Value::Int(42));
        assert_eq!(eval("1.5e1"), Value::Float(15.0));
        assert_eq!(eval(r#"'it\'s' "!""#), Value::from("it's!"));
        assert_eq!(eval("None"), Value::None);
        assert_eq!(eval("o.name"), Value::from("Ada"));
        assert_eq!(eval("o['qty']"), Value::Int(2));
        assert_eq!(eval("items[-1]"), Value::Int(3));
    }

    #[test]
    fn test_arithmetic_follows_python() {
        assert_eq!(eval("n // 2"), Value::Int(3));
        assert_eq!(eval("-7 // 2"), Value::Int(-4));
        assert_eq!(eval("-7 % 3"), Value::Int(2));
        assert_eq!(eval("n / 2"), Value::Float(3.5));
        assert_eq!(eval("2 ** 10"), Value::Int(1024));
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("'ab' * 2"), Value::from("abab"));
        assert!(evaluate("1 / 0", &ctx()).is_err());
    }

    #[test]
    fn test_comparisons_and_boolean_operators() {
        assert_eq!(eval("1 < n <= 7"), Value::Bool(true));
        assert_eq!(eval("2 in items"), Value::Bool(true));
        assert_eq!(eval("5 not in items"), Value::Bool(true));
        assert_eq!(eval("'name' in o"), Value::Bool(true));
        assert_eq!(eval("None is None"), Value::Bool(true));
        assert_eq!(eval("0 or 'x'"), Value::from("x"));
        assert_eq!(eval("0 and undefined"), Value::Int(0));
        assert_eq!(eval("not items"), Value::Bool(false));
        assert_eq!(eval("'a' if n > 5 else 'b'"), Value::from("a"));
    }

    #[test]
    fn test_collections_and_builtins() {
        assert_eq!(
            eval("(1, 'a')"),
            Value::List(vec![Value::Int(1), Value::from("a")])
        );
        assert_eq!(eval("len(items)"), Value::Int(3));
        assert_eq!(eval("list(range(1, 4))"), eval("items"));
        assert_eq!(eval("str(2.0)"), Value::from("2.0"));
        assert_eq!(eval("sum(items)"), Value::Int(6));
        assert_eq!(eval("max(items)"), Value::Int(3));
        assert_eq!(
            eval("enumerate(['a'])"),
            Value::List(vec![Value::List(vec![Value::Int(0), Value::from("a")])])
        );
        assert_eq!(
            eval("{'text:style-name': o.name}"),
            Value::map([("text:style-name", "Ada")])
        );
        assert_eq!(eval("', '.join(['a', 'b'])"), Value::from("a, b"));
        assert_eq!(eval("o.get('missing', 0)"), Value::Int(0));
    }

    #[test]
    fn test_dates_and_durations() {
        let mut ctx = Context::new();
        ctx.insert("d", NaiveDate::from_ymd_opt(2024, 2, 28).unwrap())
            .unwrap();
        ctx.insert("day", TimeDelta::days(1)).unwrap();
        assert_eq!(
            evaluate("d + day", &ctx).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(evaluate("missing", &ctx()), Err(Error::Expression(_))));
        assert!(Expr::parse("1 +").is_err());
        assert!(Expr::parse("(1").is_err());
        assert!(Expr::parse("a b").is_err());
        assert!(Expr::parse("'open").is_err());
        assert!(Expr::parse("").is_err());
        assert!(evaluate("n()", &ctx()).is_err());
        assert!(evaluate("'a' < 1", &ctx()).is_err());
    }
}
