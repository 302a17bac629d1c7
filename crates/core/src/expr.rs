//! Typed expression trees for rate laws, parameter time courses and initial
//! conditions.
//!
//! Strings are parsed once into an [`Expr<String>`], checked, and then
//! resolved with [`Expr::map_vars`] into an expression over dense variable
//! slots that is evaluated repeatedly during assembly.

mod derivative;
mod error;
mod parse;
mod units;

use std::{collections::BTreeSet, fmt};

pub use error::ParseError;

/// An elementary function that may appear in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Tanh,
    Abs,
    Heaviside,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Self::Exp,
            "log" | "ln" => Self::Log,
            "sqrt" => Self::Sqrt,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "tanh" => Self::Tanh,
            "abs" | "Abs" => Self::Abs,
            "heaviside" | "Heaviside" | "H" => Self::Heaviside,
            _ => return None,
        })
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Tanh => "tanh",
            Self::Abs => "abs",
            Self::Heaviside => "heaviside",
        }
    }

    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Sqrt => x.sqrt(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Tanh => x.tanh(),
            Self::Abs => x.abs(),
            Self::Heaviside => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    0.0
                } else {
                    0.5
                }
            }
        }
    }
}

/// An expression over variables of type `V`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<V = String> {
    Const(f64),
    Var(V),
    Neg(Box<Expr<V>>),
    Add(Box<Expr<V>>, Box<Expr<V>>),
    Sub(Box<Expr<V>>, Box<Expr<V>>),
    Mul(Box<Expr<V>>, Box<Expr<V>>),
    Div(Box<Expr<V>>, Box<Expr<V>>),
    Pow(Box<Expr<V>>, Box<Expr<V>>),
    Call(Func, Box<Expr<V>>),
}

impl Expr<String> {
    /// Parses an expression string such as `kf*A*B - kr*C` or `exp(-t/tau)`.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] locating the first offending character.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse::parse(input)
    }

    /// Shorthand for a named variable.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Renames variables according to `map`, leaving others untouched.
    #[must_use]
    pub fn rename<S: std::hash::BuildHasher>(
        &self,
        map: &std::collections::HashMap<String, String, S>,
    ) -> Self {
        self.map_vars(&mut |name: &String| -> Result<String, std::convert::Infallible> {
            Ok(map.get(name).cloned().unwrap_or_else(|| name.clone()))
        })
        .unwrap_or_else(|never| match never {})
    }
}

impl<V> Expr<V> {
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self::Const(value)
    }

    /// Returns the constant value if the expression is a literal.
    #[must_use]
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Self::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Evaluates the expression, resolving variables through `lookup`.
    pub fn eval(&self, lookup: &impl Fn(&V) -> f64) -> f64 {
        match self {
            Self::Const(c) => *c,
            Self::Var(v) => lookup(v),
            Self::Neg(a) => -a.eval(lookup),
            Self::Add(a, b) => a.eval(lookup) + b.eval(lookup),
            Self::Sub(a, b) => a.eval(lookup) - b.eval(lookup),
            Self::Mul(a, b) => a.eval(lookup) * b.eval(lookup),
            Self::Div(a, b) => a.eval(lookup) / b.eval(lookup),
            Self::Pow(a, b) => {
                let base = a.eval(lookup);
                match b.as_ref() {
                    Self::Const(e) if e.fract() == 0.0 && e.abs() < 64.0 => {
                        #[allow(clippy::cast_possible_truncation)]
                        base.powi(*e as i32)
                    }
                    exponent => base.powf(exponent.eval(lookup)),
                }
            }
            Self::Call(f, a) => f.apply(a.eval(lookup)),
        }
    }

    /// Maps every variable through a fallible function, preserving structure.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn map_vars<W, E>(&self, f: &mut impl FnMut(&V) -> Result<W, E>) -> Result<Expr<W>, E> {
        Ok(match self {
            Self::Const(c) => Expr::Const(*c),
            Self::Var(v) => Expr::Var(f(v)?),
            Self::Neg(a) => Expr::Neg(Box::new(a.map_vars(f)?)),
            Self::Add(a, b) => Expr::Add(Box::new(a.map_vars(f)?), Box::new(b.map_vars(f)?)),
            Self::Sub(a, b) => Expr::Sub(Box::new(a.map_vars(f)?), Box::new(b.map_vars(f)?)),
            Self::Mul(a, b) => Expr::Mul(Box::new(a.map_vars(f)?), Box::new(b.map_vars(f)?)),
            Self::Div(a, b) => Expr::Div(Box::new(a.map_vars(f)?), Box::new(b.map_vars(f)?)),
            Self::Pow(a, b) => Expr::Pow(Box::new(a.map_vars(f)?), Box::new(b.map_vars(f)?)),
            Self::Call(func, a) => Expr::Call(*func, Box::new(a.map_vars(f)?)),
        })
    }

    /// Replaces variables for which `f` returns an expression.
    #[must_use]
    pub fn substitute(&self, f: &impl Fn(&V) -> Option<Self>) -> Self
    where
        V: Clone,
    {
        let sub = |a: &Self| Box::new(a.substitute(f));
        match self {
            Self::Const(c) => Self::Const(*c),
            Self::Var(v) => f(v).unwrap_or_else(|| Self::Var(v.clone())),
            Self::Neg(a) => Self::Neg(sub(a)),
            Self::Add(a, b) => Self::Add(sub(a), sub(b)),
            Self::Sub(a, b) => Self::Sub(sub(a), sub(b)),
            Self::Mul(a, b) => Self::Mul(sub(a), sub(b)),
            Self::Div(a, b) => Self::Div(sub(a), sub(b)),
            Self::Pow(a, b) => Self::Pow(sub(a), sub(b)),
            Self::Call(func, a) => Self::Call(*func, sub(a)),
        }
    }

    /// Visits every variable occurrence in evaluation order.
    pub fn for_each_var<'a>(&'a self, f: &mut impl FnMut(&'a V)) {
        match self {
            Self::Const(_) => {}
            Self::Var(v) => f(v),
            Self::Neg(a) | Self::Call(_, a) => a.for_each_var(f),
            Self::Add(a, b)
            | Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Pow(a, b) => {
                a.for_each_var(f);
                b.for_each_var(f);
            }
        }
    }

    /// Returns `true` if `var` occurs anywhere in the expression.
    pub fn contains_var(&self, var: &V) -> bool
    where
        V: PartialEq,
    {
        let mut found = false;
        self.for_each_var(&mut |v| found |= v == var);
        found
    }
}

impl<V: Ord + Clone> Expr<V> {
    /// The distinct variables referenced by the expression.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<V> {
        let mut vars = BTreeSet::new();
        self.for_each_var(&mut |v| {
            vars.insert(v.clone());
        });
        vars
    }
}

impl<V> std::ops::Add for Expr<V> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::Add(Box::new(self), Box::new(rhs))
    }
}

impl<V> std::ops::Sub for Expr<V> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::Sub(Box::new(self), Box::new(rhs))
    }
}

impl<V> std::ops::Mul for Expr<V> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::Mul(Box::new(self), Box::new(rhs))
    }
}

impl<V> std::ops::Div for Expr<V> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::Div(Box::new(self), Box::new(rhs))
    }
}

impl<V> std::ops::Neg for Expr<V> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::Neg(Box::new(self))
    }
}

impl<V: fmt::Display> Expr<V> {
    fn precedence(&self) -> u8 {
        match self {
            Self::Add(..) | Self::Sub(..) => 1,
            Self::Mul(..) | Self::Div(..) => 2,
            Self::Neg(..) => 3,
            Self::Pow(..) => 4,
            Self::Const(c) if *c < 0.0 => 3,
            Self::Const(_) | Self::Var(_) | Self::Call(..) => 5,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl<V: fmt::Display> fmt::Display for Expr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{c}"),
            Self::Var(v) => write!(f, "{v}"),
            Self::Neg(a) => {
                write!(f, "-")?;
                a.fmt_child(f, 4)
            }
            Self::Add(a, b) => {
                a.fmt_child(f, 1)?;
                write!(f, " + ")?;
                b.fmt_child(f, 2)
            }
            Self::Sub(a, b) => {
                a.fmt_child(f, 1)?;
                write!(f, " - ")?;
                b.fmt_child(f, 2)
            }
            Self::Mul(a, b) => {
                a.fmt_child(f, 2)?;
                write!(f, "*")?;
                b.fmt_child(f, 3)
            }
            Self::Div(a, b) => {
                a.fmt_child(f, 2)?;
                write!(f, "/")?;
                b.fmt_child(f, 4)
            }
            Self::Pow(a, b) => {
                a.fmt_child(f, 5)?;
                write!(f, "^")?;
                b.fmt_child(f, 4)
            }
            Self::Call(func, a) => write!(f, "{}({a})", func.name()),
        }
    }
}
