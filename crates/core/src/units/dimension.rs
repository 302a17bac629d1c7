use std::{
    fmt,
    ops::{Div, Mul},
};

/// Integer exponents over the seven ISQ base dimensions.
///
/// The ordering matches `uom`'s `ISQ<L, M, T, I, Th, N, J>` parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub length: i8,
    pub mass: i8,
    pub time: i8,
    pub current: i8,
    pub temperature: i8,
    pub amount: i8,
    pub luminosity: i8,
}

impl Dimension {
    /// The dimension of a pure number.
    pub const NONE: Self = Self {
        length: 0,
        mass: 0,
        time: 0,
        current: 0,
        temperature: 0,
        amount: 0,
        luminosity: 0,
    };

    pub const LENGTH: Self = Self {
        length: 1,
        ..Self::NONE
    };

    pub const TIME: Self = Self {
        time: 1,
        ..Self::NONE
    };

    pub const AMOUNT: Self = Self {
        amount: 1,
        ..Self::NONE
    };

    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        *self == Self::NONE
    }

    #[must_use]
    pub fn powi(self, n: i32) -> Self {
        let scale = |e: i8| {
            let raised = i32::from(e) * n;
            i8::try_from(raised).unwrap_or(if raised > 0 { i8::MAX } else { i8::MIN })
        };
        Self {
            length: scale(self.length),
            mass: scale(self.mass),
            time: scale(self.time),
            current: scale(self.current),
            temperature: scale(self.temperature),
            amount: scale(self.amount),
            luminosity: scale(self.luminosity),
        }
    }

    fn zip(self, rhs: Self, f: impl Fn(i8, i8) -> i8) -> Self {
        Self {
            length: f(self.length, rhs.length),
            mass: f(self.mass, rhs.mass),
            time: f(self.time, rhs.time),
            current: f(self.current, rhs.current),
            temperature: f(self.temperature, rhs.temperature),
            amount: f(self.amount, rhs.amount),
            luminosity: f(self.luminosity, rhs.luminosity),
        }
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.zip(rhs, i8::saturating_add)
    }
}

impl Div for Dimension {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.zip(rhs, i8::saturating_sub)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let symbols = [
            ("L", self.length),
            ("M", self.mass),
            ("T", self.time),
            ("I", self.current),
            ("Θ", self.temperature),
            ("N", self.amount),
            ("J", self.luminosity),
        ];
        let mut first = true;
        for (symbol, exponent) in symbols {
            if exponent == 0 {
                continue;
            }
            if !first {
                write!(f, "·")?;
            }
            first = false;
            if exponent == 1 {
                write!(f, "{symbol}")?;
            } else {
                write!(f, "{symbol}^{exponent}")?;
            }
        }
        Ok(())
    }
}
