use super::{Expr, Func};

impl<V: Clone + PartialEq> Expr<V> {
    /// Symbolic partial derivative with respect to `var`, simplified.
    ///
    /// `abs` and `heaviside` are differentiated almost everywhere: the
    /// derivative of `abs(x)` uses the sign of `x` and that of a step is zero.
    #[must_use]
    pub fn derivative(&self, var: &V) -> Self {
        self.diff(var).simplify()
    }

    fn diff(&self, var: &V) -> Self {
        use Expr::{Add, Call, Const, Div, Mul, Neg, Pow, Sub, Var};

        let b = |e: &Self| Box::new(e.clone());
        match self {
            Const(_) => Const(0.0),
            Var(v) => Const(if v == var { 1.0 } else { 0.0 }),
            Neg(a) => Neg(Box::new(a.diff(var))),
            Add(x, y) => Add(Box::new(x.diff(var)), Box::new(y.diff(var))),
            Sub(x, y) => Sub(Box::new(x.diff(var)), Box::new(y.diff(var))),
            Mul(x, y) => Add(
                Box::new(Mul(Box::new(x.diff(var)), b(y))),
                Box::new(Mul(b(x), Box::new(y.diff(var)))),
            ),
            Div(x, y) => Div(
                Box::new(Sub(
                    Box::new(Mul(Box::new(x.diff(var)), b(y))),
                    Box::new(Mul(b(x), Box::new(y.diff(var)))),
                )),
                Box::new(Pow(b(y), Box::new(Const(2.0)))),
            ),
            Pow(x, y) if !y.contains_var(var) => {
                // d(x^n) = n * x^(n-1) * dx
                Mul(
                    Box::new(Mul(
                        b(y),
                        Box::new(Pow(b(x), Box::new(Sub(b(y), Box::new(Const(1.0)))))),
                    )),
                    Box::new(x.diff(var)),
                )
            }
            Pow(x, y) => {
                // d(x^y) = x^y * (dy * ln x + y * dx / x)
                Mul(
                    Box::new(self.clone()),
                    Box::new(Add(
                        Box::new(Mul(Box::new(y.diff(var)), Box::new(Call(Func::Log, b(x))))),
                        Box::new(Div(Box::new(Mul(b(y), Box::new(x.diff(var)))), b(x))),
                    )),
                )
            }
            Call(func, a) => {
                let outer = match func {
                    Func::Exp => self.clone(),
                    Func::Log => Div(Box::new(Const(1.0)), b(a)),
                    Func::Sqrt => Div(
                        Box::new(Const(0.5)),
                        Box::new(Call(Func::Sqrt, b(a))),
                    ),
                    Func::Sin => Call(Func::Cos, b(a)),
                    Func::Cos => Neg(Box::new(Call(Func::Sin, b(a)))),
                    Func::Tan => Div(
                        Box::new(Const(1.0)),
                        Box::new(Pow(Box::new(Call(Func::Cos, b(a))), Box::new(Const(2.0)))),
                    ),
                    Func::Tanh => Sub(
                        Box::new(Const(1.0)),
                        Box::new(Pow(Box::new(self.clone()), Box::new(Const(2.0)))),
                    ),
                    Func::Abs => Div(b(a), Box::new(self.clone())),
                    Func::Heaviside => Const(0.0),
                };
                Mul(Box::new(outer), Box::new(a.diff(var)))
            }
        }
    }

    /// Folds constants and removes additive and multiplicative identities.
    #[must_use]
    pub fn simplify(&self) -> Self {
        use Expr::{Add, Call, Const, Div, Mul, Neg, Pow, Sub, Var};

        match self {
            Const(_) | Var(_) => self.clone(),
            Neg(a) => match a.simplify() {
                Const(c) => Const(-c),
                Neg(inner) => *inner,
                other => Neg(Box::new(other)),
            },
            Add(x, y) => match (x.simplify(), y.simplify()) {
                (Const(p), Const(q)) => Const(p + q),
                (Const(z), e) | (e, Const(z)) if z == 0.0 => e,
                (p, Neg(q)) => Sub(Box::new(p), q),
                (p, q) => Add(Box::new(p), Box::new(q)),
            },
            Sub(x, y) => match (x.simplify(), y.simplify()) {
                (Const(p), Const(q)) => Const(p - q),
                (e, Const(z)) if z == 0.0 => e,
                (Const(z), e) if z == 0.0 => Neg(Box::new(e)),
                (p, q) => Sub(Box::new(p), Box::new(q)),
            },
            Mul(x, y) => match (x.simplify(), y.simplify()) {
                (Const(p), Const(q)) => Const(p * q),
                (Const(z), _) | (_, Const(z)) if z == 0.0 => Const(0.0),
                (Const(o), e) | (e, Const(o)) if o == 1.0 => e,
                (Const(m), e) | (e, Const(m)) if m == -1.0 => Neg(Box::new(e)),
                (p, q) => Mul(Box::new(p), Box::new(q)),
            },
            Div(x, y) => match (x.simplify(), y.simplify()) {
                (Const(p), Const(q)) if q != 0.0 => Const(p / q),
                (Const(z), _) if z == 0.0 => Const(0.0),
                (e, Const(o)) if o == 1.0 => e,
                (p, q) => Div(Box::new(p), Box::new(q)),
            },
            Pow(x, y) => match (x.simplify(), y.simplify()) {
                (_, Const(z)) if z == 0.0 => Const(1.0),
                (e, Const(o)) if o == 1.0 => e,
                (Const(p), Const(q)) => Const(p.powf(q)),
                (p, q) => Pow(Box::new(p), Box::new(q)),
            },
            Call(func, a) => match a.simplify() {
                Const(c) => Const(func.apply(c)),
                other => Call(*func, Box::new(other)),
            },
        }
    }
}
