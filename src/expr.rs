//! Parser for schema expressions.
//!
//! Expressions may be wrapped as `${...}`. Supported:
//! - literals: decimal and `0x` hexadecimal integers, quoted strings, `true`, `false`, `null`;
//! - `self`, `up[i]` (ancestor `i`, `up[0]` is `self`) and named variables such as `$length`;
//! - property access `a.b` and indexing `a[i]`;
//! - `|| && == != < <= > >= + - * / %` and unary `- !`, with the keyword forms
//!   `or and eq ne lt le gt ge div mod not`;
//! - the `length(x)` function, also spelled `fn:length(x)`.

use std::fmt;

use crate::{errors::ExprError, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        };
        f.write_str(symbol)
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    SelfRef,
    /// `up[i]`
    Up(Box<Expr>),
    Variable(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

impl Expr {
    /// Whether the expression reads the variable `name` anywhere.
    pub fn references(&self, name: &str) -> bool {
        match self {
            Expr::Variable(variable) => variable == name,
            Expr::Literal(_) | Expr::SelfRef => false,
            Expr::Up(inner) | Expr::Property(inner, _) | Expr::Unary(_, inner) => {
                inner.references(name)
            }
            Expr::Index(lhs, rhs) | Expr::Binary(_, lhs, rhs) => {
                lhs.references(name) || rhs.references(name)
            }
            Expr::Call(_, args) => args.iter().any(|arg| arg.references(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    Symbol(&'static str),
}

const SYMBOLS: [&str; 20] = [
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "+", "-", "*", "/", "%", "!", "(", ")", "[",
    "]", ".", ",",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Lexes `body`, reporting errors against the full source `src`.
    fn new(src: &'a str, body: &str) -> Self {
        Self {
            src,
            chars: body.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            expr: self.src.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c.is_ascii_digit() {
                tokens.push(self.number()?);
            } else if c == '\'' || c == '"' {
                tokens.push(self.string(c)?);
            } else if is_ident_start(c) {
                tokens.push(self.ident());
            } else {
                tokens.push(self.symbol()?);
            }
        }

        Ok(tokens)
    }

    fn number(&mut self) -> Result<Token, ExprError> {
        let (radix, start) = match (self.peek(0), self.peek(1)) {
            (Some('0'), Some('x' | 'X')) => (16, self.pos + 2),
            _ => (10, self.pos),
        };

        self.pos = start;
        while self.peek(0).is_some_and(|c| c.is_digit(radix)) {
            self.pos += 1;
        }

        let digits: String = self.chars[start..self.pos].iter().collect();
        if digits.is_empty() {
            return Err(self.error("hexadecimal literal without digits"));
        }

        if let Ok(v) = i64::from_str_radix(&digits, radix) {
            Ok(Token::Number(Value::Int(v)))
        } else if let Ok(v) = u64::from_str_radix(&digits, radix) {
            Ok(Token::Number(Value::UInt(v)))
        } else {
            Err(self.error(format!("integer literal {digits} is too large")))
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, ExprError> {
        self.pos += 1;
        let mut text = String::new();

        loop {
            match self.peek(0) {
                None => return Err(self.error("unterminated string literal")),
                Some('\\') => {
                    let escaped = self
                        .peek(1)
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    text.push(escaped);
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(Token::Str(text));
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_char) {
            self.pos += 1;
        }

        // namespaced function name, e.g. fn:length
        if self.peek(0) == Some(':') && self.peek(1).is_some_and(is_ident_start) {
            self.pos += 1;
            while self.peek(0).is_some_and(is_ident_char) {
                self.pos += 1;
            }
        }

        Token::Ident(self.chars[start..self.pos].iter().collect())
    }

    fn symbol(&mut self) -> Result<Token, ExprError> {
        let rest: String = self.chars[self.pos..].iter().take(2).collect();
        for symbol in SYMBOLS {
            if rest.starts_with(symbol) {
                self.pos += symbol.chars().count();
                return Ok(Token::Symbol(symbol));
            }
        }

        Err(self.error(format!("unexpected character {:?}", self.chars[self.pos])))
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            expr: self.src.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), ExprError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("expected {symbol:?}")))
        }
    }

    /// Consumes the next token if it is one of the given operators (symbol or keyword form).
    fn binary_op(&mut self, ops: &[(&str, &str, BinaryOp)]) -> Option<BinaryOp> {
        let token = self.peek()?;
        let op = ops.iter().find_map(|(symbol, keyword, op)| match token {
            Token::Symbol(s) if s == symbol => Some(*op),
            Token::Ident(id) if id == keyword => Some(*op),
            _ => None,
        })?;
        self.pos += 1;
        Some(op)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, &str, BinaryOp)],
        operand: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut lhs = operand(self)?;
        while let Some(op) = self.binary_op(ops) {
            let rhs = operand(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[("||", "or", BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[("&&", "and", BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[("==", "eq", BinaryOp::Eq), ("!=", "ne", BinaryOp::Ne)],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                ("<=", "le", BinaryOp::Le),
                (">=", "ge", BinaryOp::Ge),
                ("<", "lt", BinaryOp::Lt),
                (">", "gt", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[("+", "+", BinaryOp::Add), ("-", "-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                ("*", "*", BinaryOp::Mul),
                ("/", "div", BinaryOp::Div),
                ("%", "mod", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_symbol("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat_symbol("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if matches!(self.peek(), Some(Token::Ident(id)) if id == "not") {
            self.pos += 1;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;

        loop {
            if self.eat_symbol(".") {
                match self.next() {
                    Some(Token::Ident(name)) => {
                        expr = Expr::Property(Box::new(expr), name);
                    }
                    _ => return Err(self.error("expected property name after '.'")),
                }
            } else if self.eat_symbol("[") {
                let index = self.or()?;
                self.expect_symbol("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Literal(value)),
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::Text(text))),
            Some(Token::Symbol("(")) => {
                let expr = self.or()?;
                self.expect_symbol(")")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => self.identifier(name),
            Some(token) => Err(self.error(format!("unexpected token {token:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, ExprError> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            "self" => return Ok(Expr::SelfRef),
            _ => {}
        }

        if name == "up" && self.eat_symbol("[") {
            let index = self.or()?;
            self.expect_symbol("]")?;
            return Ok(Expr::Up(Box::new(index)));
        }

        if self.eat_symbol("(") {
            let mut args = Vec::new();
            if !self.eat_symbol(")") {
                loop {
                    args.push(self.or()?);
                    if self.eat_symbol(")") {
                        break;
                    }
                    self.expect_symbol(",")?;
                }
            }
            let function = name.strip_prefix("fn:").unwrap_or(&name);
            if function != "length" {
                return Err(self.error(format!("unknown function {name}")));
            }
            return Ok(Expr::Call(function.to_string(), args));
        }

        Ok(Expr::Variable(name))
    }
}

/// Strips an optional `${...}` wrapper.
fn unwrap_template(src: &str) -> &str {
    let trimmed = src.trim();
    trimmed
        .strip_prefix("${")
        .and_then(|inner| inner.strip_suffix('}'))
        .unwrap_or(trimmed)
}

/// Parses `src` into an expression tree.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let body = unwrap_template(src);
    let tokens = Lexer::new(src, body).tokenize()?;

    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }

    Ok(expr)
}
