//! Chip-distribution and SAR functions.
//!
//! These depend on per-holder volume distributions the engine does not
//! model, so apart from `cost` they are declared stubs: real arities, NaN
//! results.

use klinec_util::SeriesExt;

use super::{add, stub, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "cost", cost);
    add(table, "costex", stub);
    add(table, "lfs", stub);
    add(table, "lwinner", stub);
    add(table, "pwinner", stub);
    add(table, "winner", stub);
    add(table, "ppart", stub);
    add(table, "sar", stub);
    add(table, "sarturn", stub);
    add(table, "newsar", stub);
    add(table, "totalrange", stub);
}

/// Simplified cost line: the argument when given, otherwise the close.
fn cost(ctx: &mut FunctionContext) -> BuiltinResult {
    let bar = ctx.bar();
    let value = if ctx.arg_count() > 0 {
        ctx.arg_num(0)?
    } else {
        match ctx.builtin_var("close") {
            Some(close) => close.value_at(bar),
            None => f64::NAN,
        }
    };
    Ok(ctx.finish(value))
}
