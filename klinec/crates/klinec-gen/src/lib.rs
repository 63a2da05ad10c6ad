//! klinec-gen - AST to bytecode compilers.
//!
//! One compiler per dialect, all leaning on the shared [`emit::Emitter`] for
//! constant-pool management, global-slot allocation, intermediate-slot
//! allocation on math opcodes, jump backpatching, and the builtin calling
//! convention (arity check + `monostate` padding of optional arguments).
//!
//! Code is emitted strictly left-to-right in one pass; the only second pass
//! is jump backpatching.

mod emit;

pub mod easylang;
pub mod hithink;
pub mod pine;

pub use easylang::compile as compile_easylang;
pub use hithink::compile as compile_hithink;
pub use pine::compile as compile_pine;

use klinec_par::SyntaxError;
use thiserror::Error;

/// Errors that abort compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The parser reported diagnostics; no bytecode is produced.
    #[error("parse failed with {} syntax error(s); first: {}", .errors.len(), .errors[0])]
    Syntax { errors: Vec<SyntaxError> },

    #[error("line {line}: call to unmapped function '{name}'")]
    UnknownFunction { name: String, line: u32 },

    #[error("line {line}: {name} expects between {min} and {max} arguments, got {got}")]
    ArityMismatch {
        name: String,
        min: usize,
        max: usize,
        got: usize,
        line: u32,
    },

    #[error("line {line}: unsupported operator '{op}'")]
    UnsupportedOperator { op: String, line: u32 },

    #[error("line {line}: {message}")]
    Unsupported { message: String, line: u32 },

    #[error("jump offset too large")]
    JumpTooFar,
}
