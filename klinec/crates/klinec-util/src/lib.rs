//! klinec-util - Shared value model for the kline compiler and VM.
//!
//! This crate holds the two types every other stage depends on: [`Series`],
//! a named vector of per-bar doubles, and [`Value`], the tagged runtime value.
//! Both the constant pool of the bytecode and the VM operand stack are built
//! from [`Value`], so this crate sits at the bottom of the workspace graph.

mod error;
mod series;
mod value;

pub use error::ValueError;
pub use series::{new_series_ref, Series, SeriesExt, SeriesRef};
pub use value::Value;
