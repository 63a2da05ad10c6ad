//! klinec-drv - Compile-and-run driver.
//!
//! Glue between the frontends, the VM, and the outside world: the dialect
//! selector, the CSV/JSON bar-data adapters, and the run loop used by the
//! `klinec` binary. The core contract is narrow on purpose: adapters only
//! ever register named series of doubles, and results come back through the
//! VM's plot registry.

pub mod data;

use std::fmt;
use std::str::FromStr;

use klinec_gen::{compile_easylang, compile_hithink, compile_pine, CompileError};
use klinec_ir::Bytecode;

/// Source dialect selector. Accepts the single-letter spellings of the CLI
/// (`p`/`e`/`h`) as well as full names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Pine,
    EasyLanguage,
    Hithink,
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p" | "pine" => Ok(Dialect::Pine),
            "e" | "el" | "easylanguage" => Ok(Dialect::EasyLanguage),
            "h" | "tdx" | "hithink" => Ok(Dialect::Hithink),
            other => Err(format!(
                "unknown dialect '{}' (expected p/pine, e/el, or h/hithink)",
                other
            )),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Pine => write!(f, "pine"),
            Dialect::EasyLanguage => write!(f, "easylanguage"),
            Dialect::Hithink => write!(f, "hithink"),
        }
    }
}

/// Compiles `source` with the selected frontend.
pub fn compile(dialect: Dialect, source: &str) -> Result<Bytecode, CompileError> {
    tracing::debug!(%dialect, bytes = source.len(), "compiling script");
    match dialect {
        Dialect::Pine => compile_pine(source),
        Dialect::EasyLanguage => compile_easylang(source),
        Dialect::Hithink => compile_hithink(source),
    }
}
