use std::f64::consts::PI;

use super::{Expr, Func, ParseError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Open,
    Close,
}

pub(super) fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.sum()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                i += 1;
                Token::Caret
            }
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'^' => Token::Caret,
            b'(' => Token::Open,
            b')' => Token::Close,
            b'0'..=b'9' | b'.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &input[start..i];
                let value = text.parse::<f64>().map_err(|_| ParseError {
                    input: input.to_owned(),
                    position: start,
                    reason: format!("invalid number `{text}`"),
                })?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((start, Token::Ident(input[start..i].to_owned())));
                continue;
            }
            _ => {
                return Err(ParseError {
                    input: input.to_owned(),
                    position: start,
                    reason: format!(
                        "unexpected character `{}`",
                        input[start..].chars().next().unwrap_or('?')
                    ),
                });
            }
        };
        i += 1;
        tokens.push((start, token));
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> ParseError {
        ParseError {
            input: self.input.to_owned(),
            position: self
                .tokens
                .get(self.pos)
                .map_or(self.input.len(), |(p, _)| *p),
            reason: reason.to_owned(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.product()?;
        loop {
            if self.eat(&Token::Plus) {
                lhs = lhs + self.product()?;
            } else if self.eat(&Token::Minus) {
                lhs = lhs - self.product()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                lhs = lhs * self.unary()?;
            } else if self.eat(&Token::Slash) {
                lhs = lhs / self.unary()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            return Ok(match self.unary()? {
                Expr::Const(c) => Expr::Const(-c),
                other => -other,
            });
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.eat(&Token::Caret) {
            let exponent = self.unary()?;
            return Ok(Expr::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let Some((_, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        match token {
            Token::Number(value) => {
                self.pos += 1;
                Ok(Expr::Const(value))
            }
            Token::Open => {
                self.pos += 1;
                let inner = self.sum()?;
                if !self.eat(&Token::Close) {
                    return Err(self.error("expected `)`"));
                }
                Ok(inner)
            }
            Token::Ident(name) => {
                self.pos += 1;
                if self.peek() == Some(&Token::Open) {
                    let Some(func) = Func::from_name(&name) else {
                        self.pos -= 1;
                        return Err(self.error(&format!("unknown function `{name}`")));
                    };
                    self.pos += 1;
                    let arg = self.sum()?;
                    if !self.eat(&Token::Close) {
                        return Err(self.error("expected `)` after function argument"));
                    }
                    return Ok(Expr::Call(func, Box::new(arg)));
                }
                if name == "pi" {
                    return Ok(Expr::Const(PI));
                }
                Ok(Expr::Var(name))
            }
            _ => Err(self.error("expected a number, name or `(`")),
        }
    }
}
