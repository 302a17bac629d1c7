//! Recursive-descent parser for unit strings such as `molecule/um^2/s`.

use uom::si::{
    amount_of_substance::{micromole, millimole, mole, nanomole, picomole},
    f64::{AmountOfSubstance, Length, Time, Volume},
    length::{centimeter, meter, micrometer, millimeter, nanometer},
    time::{hour, millisecond, minute, second},
    volume::{cubic_micrometer, liter, microliter, milliliter},
};

use super::{Dimension, UnitError};

/// Avogadro constant, 1/mol.
pub const AVOGADRO: f64 = 6.022_140_76e23;

/// Resolves a unit atom into its SI scale factor and dimension.
fn atom(symbol: &str) -> Option<(f64, Dimension)> {
    let length = |l: Length| (l.value, Dimension::LENGTH);
    let time = |t: Time| (t.value, Dimension::TIME);
    let amount = |n: AmountOfSubstance| (n.value, Dimension::AMOUNT);
    let volume = |v: Volume| (v.value, Dimension::LENGTH.powi(3));
    let molar = |n: AmountOfSubstance| {
        let per_liter = n / Volume::new::<liter>(1.0);
        (per_liter.value, Dimension::AMOUNT / Dimension::LENGTH.powi(3))
    };

    let resolved = match symbol {
        "1" | "dimensionless" => (1.0, Dimension::NONE),
        "m" | "meter" => length(Length::new::<meter>(1.0)),
        "cm" => length(Length::new::<centimeter>(1.0)),
        "mm" => length(Length::new::<millimeter>(1.0)),
        "um" | "µm" | "micron" => length(Length::new::<micrometer>(1.0)),
        "nm" => length(Length::new::<nanometer>(1.0)),
        "s" | "sec" | "second" => time(Time::new::<second>(1.0)),
        "ms" => time(Time::new::<millisecond>(1.0)),
        "min" | "minute" => time(Time::new::<minute>(1.0)),
        "h" | "hour" => time(Time::new::<hour>(1.0)),
        "mol" | "mole" => amount(AmountOfSubstance::new::<mole>(1.0)),
        "mmol" => amount(AmountOfSubstance::new::<millimole>(1.0)),
        "umol" | "µmol" => amount(AmountOfSubstance::new::<micromole>(1.0)),
        "nmol" => amount(AmountOfSubstance::new::<nanomole>(1.0)),
        "pmol" => amount(AmountOfSubstance::new::<picomole>(1.0)),
        "molecule" | "molecules" => (
            AmountOfSubstance::new::<mole>(1.0).value / AVOGADRO,
            Dimension::AMOUNT,
        ),
        "L" | "l" | "liter" => volume(Volume::new::<liter>(1.0)),
        "mL" | "ml" => volume(Volume::new::<milliliter>(1.0)),
        "uL" | "µL" | "ul" => volume(Volume::new::<microliter>(1.0)),
        "fL" | "fl" => volume(Volume::new::<cubic_micrometer>(1.0)),
        "M" | "molar" => molar(AmountOfSubstance::new::<mole>(1.0)),
        "mM" => molar(AmountOfSubstance::new::<millimole>(1.0)),
        "uM" | "µM" => molar(AmountOfSubstance::new::<micromole>(1.0)),
        "nM" => molar(AmountOfSubstance::new::<nanomole>(1.0)),
        "pM" => molar(AmountOfSubstance::new::<picomole>(1.0)),
        _ => return None,
    };
    Some(resolved)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(String),
    Number(f64),
    Mul,
    Div,
    Pow,
    Open,
    Close,
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

/// Parses a unit string into `(scale, dimension)`.
pub(super) fn parse(input: &str) -> Result<(f64, Dimension), UnitError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok((1.0, Dimension::NONE));
    }
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let value = parser.product()?;
    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(parser.error(*position, format!("unexpected token {token:?}")));
    }
    Ok(value)
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, UnitError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (position, c) = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '*' => {
                if chars.get(i + 1).is_some_and(|&(_, n)| n == '*') {
                    tokens.push((position, Token::Pow));
                    i += 2;
                } else {
                    tokens.push((position, Token::Mul));
                    i += 1;
                }
            }
            '·' => {
                tokens.push((position, Token::Mul));
                i += 1;
            }
            '/' => {
                tokens.push((position, Token::Div));
                i += 1;
            }
            '^' => {
                tokens.push((position, Token::Pow));
                i += 1;
            }
            '(' => {
                tokens.push((position, Token::Open));
                i += 1;
            }
            ')' => {
                tokens.push((position, Token::Close));
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let end = chars.get(i).map_or(input.len(), |&(p, _)| p);
                let text = &input[position..end];
                let value = text.parse::<f64>().map_err(|_| UnitError::Parse {
                    input: input.to_owned(),
                    position: chars[start].0,
                    reason: format!("invalid number `{text}`"),
                })?;
                tokens.push((position, Token::Number(value)));
            }
            c if c.is_alphabetic() || c == '_' || c == 'µ' => {
                i += 1;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let end = chars.get(i).map_or(input.len(), |&(p, _)| p);
                tokens.push((position, Token::Symbol(input[position..end].to_owned())));
            }
            other => {
                return Err(UnitError::Parse {
                    input: input.to_owned(),
                    position,
                    reason: format!("unexpected character `{other}`"),
                });
            }
        }
    }
    Ok(tokens)
}

impl Parser<'_> {
    fn error(&self, position: usize, reason: String) -> UnitError {
        UnitError::Parse {
            input: self.input.to_owned(),
            position,
            reason,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input.len(), |(p, _)| *p)
    }

    fn product(&mut self) -> Result<(f64, Dimension), UnitError> {
        let (mut scale, mut dim) = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Mul) => {
                    self.pos += 1;
                    let (s, d) = self.factor()?;
                    scale *= s;
                    dim = dim * d;
                }
                Some(Token::Div) => {
                    self.pos += 1;
                    let (s, d) = self.factor()?;
                    scale /= s;
                    dim = dim / d;
                }
                _ => return Ok((scale, dim)),
            }
        }
    }

    fn factor(&mut self) -> Result<(f64, Dimension), UnitError> {
        let (scale, dim) = self.primary()?;
        if self.peek() != Some(&Token::Pow) {
            return Ok((scale, dim));
        }
        self.pos += 1;
        let position = self.position();
        let exponent = match self.tokens.get(self.pos) {
            Some((_, Token::Number(n))) if n.fract() == 0.0 => *n,
            _ => return Err(self.error(position, "expected an integer exponent".into())),
        };
        self.pos += 1;
        #[allow(clippy::cast_possible_truncation)]
        let n = exponent as i32;
        Ok((scale.powi(n), dim.powi(n)))
    }

    fn primary(&mut self) -> Result<(f64, Dimension), UnitError> {
        let position = self.position();
        match self.tokens.get(self.pos).map(|(_, t)| t.clone()) {
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.product()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.error(self.position(), "expected `)`".into()));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok((n, Dimension::NONE))
            }
            Some(Token::Symbol(symbol)) => {
                self.pos += 1;
                atom(&symbol).ok_or_else(|| UnitError::UnknownSymbol {
                    input: self.input.to_owned(),
                    symbol,
                })
            }
            Some(token) => Err(self.error(position, format!("unexpected token {token:?}"))),
            None => Err(self.error(position, "unexpected end of input".into())),
        }
    }
}
