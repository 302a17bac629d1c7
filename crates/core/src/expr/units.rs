use std::fmt::Display;

use crate::units::{Unit, UnitError};

use super::Expr;

impl<V: Clone + PartialEq + Display> Expr<V> {
    /// The unit of the expression's value given the units of its variables.
    ///
    /// # Errors
    ///
    /// Returns a [`UnitError`] if a sum mixes dimensions, a dimensioned base
    /// is raised to a non-constant or non-integer power, a function receives
    /// a dimensioned argument, or a variable has no known unit.
    pub fn units(&self, lookup: &impl Fn(&V) -> Option<Unit>) -> Result<Unit, UnitError> {
        self.with_units(lookup).map(|(_, unit)| unit)
    }

    /// Like [`Expr::units`], but also returns a rewritten expression in which
    /// every operand of a sum is converted into the unit of the leftmost term
    /// and every function argument is scaled to a pure number.
    ///
    /// Evaluating the rewritten expression on raw magnitudes yields a value
    /// in the returned unit.
    ///
    /// # Errors
    ///
    /// See [`Expr::units`].
    pub fn with_units(
        &self,
        lookup: &impl Fn(&V) -> Option<Unit>,
    ) -> Result<(Self, Unit), UnitError> {
        match self {
            Self::Const(c) => Ok((Self::Const(*c), Unit::dimensionless())),
            Self::Var(v) => {
                let unit = lookup(v).ok_or_else(|| UnitError::UnknownVariable {
                    name: v.to_string(),
                })?;
                Ok((self.clone(), unit))
            }
            Self::Neg(a) => {
                let (a, unit) = a.with_units(lookup)?;
                Ok((-a, unit))
            }
            Self::Add(x, y) | Self::Sub(x, y) => {
                let (x, ux) = x.with_units(lookup)?;
                let (y, uy) = y.with_units(lookup)?;
                let factor = uy.conversion_factor(&ux)?;
                let y = scaled(y, factor);
                let combined = if matches!(self, Self::Add(..)) {
                    x + y
                } else {
                    x - y
                };
                Ok((combined, ux))
            }
            Self::Mul(x, y) => {
                let (x, ux) = x.with_units(lookup)?;
                let (y, uy) = y.with_units(lookup)?;
                Ok((x * y, &ux * &uy))
            }
            Self::Div(x, y) => {
                let (x, ux) = x.with_units(lookup)?;
                let (y, uy) = y.with_units(lookup)?;
                Ok((x / y, &ux / &uy))
            }
            Self::Pow(x, y) => {
                let (base, ub) = x.with_units(lookup)?;
                let (exponent, ue) = y.with_units(lookup)?;
                let exponent = scaled(exponent, ue.conversion_factor(&Unit::dimensionless())?);
                if ub.is_dimensionless() {
                    let base = scaled(base, ub.scale());
                    return Ok((
                        Self::Pow(Box::new(base), Box::new(exponent)),
                        Unit::dimensionless(),
                    ));
                }
                match exponent.simplify() {
                    Self::Const(n) if n.fract() == 0.0 && n.abs() <= f64::from(i8::MAX) => {
                        #[allow(clippy::cast_possible_truncation)]
                        let unit = ub.powi(n as i32);
                        Ok((Self::Pow(Box::new(base), Box::new(exponent)), unit))
                    }
                    other => Err(UnitError::NonIntegerPower {
                        exponent: other.to_string(),
                    }),
                }
            }
            Self::Call(func, a) => {
                let (a, unit) = a.with_units(lookup)?;
                if !unit.is_dimensionless() {
                    return Err(UnitError::DimensionedArgument {
                        function: func.name().to_owned(),
                        unit: unit.to_string(),
                    });
                }
                Ok((
                    Self::Call(*func, Box::new(scaled(a, unit.scale()))),
                    Unit::dimensionless(),
                ))
            }
        }
    }
}

fn scaled<V>(expr: Expr<V>, factor: f64) -> Expr<V> {
    if factor == 1.0 {
        expr
    } else {
        Expr::Const(factor) * expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::units::Dimension;

    fn lookup(name: &String) -> Option<Unit> {
        let symbol = match name.as_str() {
            "A" | "B" => "uM",
            "kon" => "1/(uM*s)",
            "koff" => "1/s",
            "C" => "nM",
            "L" => "um",
            _ => return None,
        };
        Unit::parse(symbol).ok()
    }

    #[test]
    fn mass_action_rate_has_concentration_per_time() {
        let expr = Expr::parse("kon*A*B - koff*A").unwrap();
        let unit = expr.units(&lookup).unwrap();
        let expected = Unit::parse("uM/s").unwrap();
        assert_eq!(unit.dimension(), expected.dimension());
        assert_relative_eq!(unit.conversion_factor(&expected).unwrap(), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn sums_are_converted_to_the_leftmost_unit() {
        let expr = Expr::parse("A + C").unwrap();
        let (rewritten, unit) = expr.with_units(&lookup).unwrap();
        assert_eq!(unit.symbol(), "uM");
        // 1 uM + 500 nM = 1.5 uM
        let value = rewritten.eval(&|name: &String| if name == "A" { 1.0 } else { 500.0 });
        assert_relative_eq!(value, 1.5, max_relative = 1e-12);
    }

    #[test]
    fn mixed_dimensions_in_a_sum_are_rejected() {
        let expr = Expr::parse("A + L").unwrap();
        assert!(matches!(expr.units(&lookup), Err(UnitError::Incompatible { .. })));
    }

    #[test]
    fn powers_and_functions() {
        let squared = Expr::parse("L^2").unwrap().units(&lookup).unwrap();
        assert_eq!(squared.dimension(), Dimension::LENGTH.powi(2));
        let folded = Expr::parse("L^(1+2)").unwrap().units(&lookup).unwrap();
        assert_eq!(folded.dimension(), Dimension::LENGTH.powi(3));

        let ratio = Expr::parse("exp(-C/A)").unwrap();
        let (rewritten, unit) = ratio.with_units(&lookup).unwrap();
        assert!(unit.is_dimensionless());
        // C/A in nM/uM must be scaled by 1e-3 before exponentiation.
        let value = rewritten.eval(&|name: &String| if name == "C" { 1000.0 } else { 1.0 });
        assert_relative_eq!(value, (-1.0f64).exp(), max_relative = 1e-12);

        assert!(matches!(
            Expr::parse("exp(A)").unwrap().units(&lookup),
            Err(UnitError::DimensionedArgument { .. })
        ));
        assert!(matches!(
            Expr::parse("A^koff").unwrap().units(&lookup),
            Err(UnitError::Incompatible { .. })
        ));
        assert!(matches!(
            Expr::parse("A^0.5").unwrap().units(&lookup),
            Err(UnitError::NonIntegerPower { .. })
        ));
    }

    #[test]
    fn unknown_variable_is_reported() {
        let err = Expr::parse("q*A").unwrap().units(&lookup).unwrap_err();
        assert_eq!(err, UnitError::UnknownVariable { name: "q".into() });
    }
}
