use thiserror::Error;

/// An expression string could not be parsed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot parse `{input}` at position {position}: {reason}")]
pub struct ParseError {
    pub input: String,
    pub position: usize,
    pub reason: String,
}
