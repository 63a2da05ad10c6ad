//! The builtin function library.
//!
//! Every builtin is registered with the arity range declared in the shared
//! signature table and a body of type [`crate::BuiltinFn`]. Bodies receive a
//! [`FunctionContext`] and write per-bar values into their cached result
//! series; `NaN` propagates throughout and is never an error.

mod averages;
mod extremes;
mod logic;
mod math;
mod refs;
mod shape;
mod stats;

use klinec_ir::builtin_arity;
use klinec_util::{SeriesExt, SeriesRef, Value};
use rustc_hash::FxHashMap;

use crate::context::FunctionContext;
use crate::{BuiltinFn, BuiltinInfo, RuntimeErrorKind};

pub(crate) type Table = FxHashMap<&'static str, BuiltinInfo>;
pub(crate) type BuiltinResult = Result<Value, RuntimeErrorKind>;

pub(crate) fn register_all(table: &mut Table) {
    averages::register(table);
    extremes::register(table);
    logic::register(table);
    math::register(table);
    refs::register(table);
    shape::register(table);
    stats::register(table);
}

/// Registers `func` under `name` with the arity from the signature table.
fn add(table: &mut Table, name: &'static str, func: BuiltinFn) {
    match builtin_arity(name) {
        Some(arity) => {
            table.insert(
                name,
                BuiltinInfo {
                    func,
                    min_args: arity.min,
                    max_args: arity.max,
                },
            );
        }
        None => debug_assert!(false, "builtin '{}' missing from the signature table", name),
    }
}

/// Body of a not-yet-implemented builtin: the result series is returned
/// untouched, so it reads as NaN everywhere. The arity stays real so
/// scripts using these names still compile and run.
fn stub(ctx: &mut FunctionContext) -> BuiltinResult {
    Ok(Value::Series(ctx.result()))
}

/// Non-NaN values of the trailing window of `length` bars ending at `bar`.
fn window_values(series: &SeriesRef, bar: i64, length: i64) -> Vec<f64> {
    let mut values = Vec::new();
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = series.value_at(bar - i);
        if !v.is_nan() {
            values.push(v);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use klinec_ir::signatures::known_names;

    #[test]
    fn every_signature_has_an_implementation() {
        let mut table = Table::default();
        register_all(&mut table);
        for name in known_names() {
            assert!(table.contains_key(name), "no implementation for '{}'", name);
        }
    }

    #[test]
    fn every_implementation_matches_its_signature() {
        let mut table = Table::default();
        register_all(&mut table);
        for (name, info) in &table {
            let arity = builtin_arity(name).expect("implementation without signature");
            assert_eq!(info.min_args, arity.min, "min arity mismatch for '{}'", name);
            assert_eq!(info.max_args, arity.max, "max arity mismatch for '{}'", name);
        }
    }
}
