use thiserror::Error;

use super::Dimension;

/// Errors produced while parsing or combining units.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    /// The unit string could not be parsed.
    #[error("cannot parse unit `{input}` at position {position}: {reason}")]
    Parse {
        input: String,
        position: usize,
        reason: String,
    },

    /// An atom in the unit string is not a known unit symbol.
    #[error("unknown unit symbol `{symbol}` in `{input}`")]
    UnknownSymbol { input: String, symbol: String },

    /// Two quantities were combined but their dimensions differ.
    #[error("incompatible units: {left} ({left_dim}) vs {right} ({right_dim})")]
    Incompatible {
        left: String,
        right: String,
        left_dim: Dimension,
        right_dim: Dimension,
    },

    /// A non-integer or non-constant power was applied to a dimensioned value.
    #[error("power of a dimensioned quantity must be a constant integer, got {exponent}")]
    NonIntegerPower { exponent: String },

    /// A function was applied to a dimensioned argument.
    #[error("argument of `{function}` must be dimensionless, got {unit}")]
    DimensionedArgument { function: String, unit: String },

    /// A variable in an expression has no known unit.
    #[error("no unit known for `{name}`")]
    UnknownVariable { name: String },
}
