//! klinec-par - Dialect ASTs and recursive-descent parsers.
//!
//! One parser per dialect, all built the same way: a token window of
//! `previous`/`current` over the dialect lexer, `advance`/`consume`/`match`
//! primitives, precedence climbing for expressions, and panic-mode recovery
//! that records one diagnostic per error site and synchronizes to the next
//! statement boundary.
//!
//! Each dialect keeps its own AST (a tagged enum per syntactic class) because
//! the statement surfaces genuinely differ: Pine has block `if` and member
//! access, EasyLanguage has declaration headers and `PlotN`, Hithink has the
//! output/internal binding split.

pub mod easylang;
pub mod hithink;
pub mod pine;

use klinec_lex::{Token, TokenKind};
use thiserror::Error;

/// A single parse or lex diagnostic with its 1-based source line.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("[line {line}] {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

impl SyntaxError {
    /// Diagnostic pointing at a token, in the classic
    /// `[line N] Error at 'lexeme': message` shape.
    pub fn at_token(token: &Token, message: &str) -> Self {
        let location = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        SyntaxError {
            line: token.line,
            message: format!("Error{}: {}", location, message),
        }
    }
}

/// A literal appearing in source: the only constant shapes any dialect has.
#[derive(Clone, Debug, PartialEq)]
pub enum Lit {
    Num(f64),
    Str(String),
    Bool(bool),
}
