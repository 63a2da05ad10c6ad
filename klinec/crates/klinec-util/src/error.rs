//! Errors for value coercion.

use thiserror::Error;

/// Raised when a [`crate::Value`] cannot be coerced to the requested shape.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    /// Operand type has no numeric interpretation (e.g. a string in `a + b`).
    #[error("unsupported operand type for numeric operation: {0}")]
    NotNumeric(&'static str),

    /// Operand type has no boolean interpretation.
    #[error("unsupported operand type for boolean operation: {0}")]
    NotBoolean(&'static str),

    /// A series was required but something else was supplied.
    #[error("expected a series operand, got {0}")]
    NotSeries(&'static str),

    /// A string was required but something else was supplied.
    #[error("expected a string operand, got {0}")]
    NotString(&'static str),
}
