//! Window extremes and ranked extreme finders.

use std::cmp::Ordering;

use klinec_util::SeriesExt;

use super::{add, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "hhv", hhv);
    add(table, "llv", llv);
    add(table, "hv", hv);
    add(table, "lv", lv);
    add(table, "hhvbars", hhvbars);
    add(table, "llvbars", llvbars);
    add(table, "findhigh", findhigh);
    add(table, "findhighbars", findhighbars);
    add(table, "findlow", findlow);
    add(table, "findlowbars", findlowbars);
}

/// Extreme over the last `length` bars. `include_current` is false for the
/// `hv`/`lv` variants, which skip the bar being computed.
fn window_extreme(
    ctx: &mut FunctionContext,
    highest: bool,
    include_current: bool,
) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let start = if include_current { 0 } else { 1 };
    let mut best = f64::NAN;
    for i in start..length {
        if bar - i < 0 {
            break;
        }
        let v = source.value_at(bar - i);
        if v.is_nan() {
            continue;
        }
        if best.is_nan() || (highest && v > best) || (!highest && v < best) {
            best = v;
        }
    }
    Ok(ctx.finish(best))
}

fn hhv(ctx: &mut FunctionContext) -> BuiltinResult {
    window_extreme(ctx, true, true)
}

fn llv(ctx: &mut FunctionContext) -> BuiltinResult {
    window_extreme(ctx, false, true)
}

fn hv(ctx: &mut FunctionContext) -> BuiltinResult {
    window_extreme(ctx, true, false)
}

fn lv(ctx: &mut FunctionContext) -> BuiltinResult {
    window_extreme(ctx, false, false)
}

/// Offset back to the window extreme; ties go to the older bar.
fn extreme_offset(ctx: &mut FunctionContext, highest: bool) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut best = f64::NAN;
    let mut offset = -1i64;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = source.value_at(bar - i);
        if v.is_nan() {
            continue;
        }
        if offset < 0 || (highest && v >= best) || (!highest && v <= best) {
            best = v;
            offset = i;
        }
    }
    Ok(ctx.finish(offset as f64))
}

fn hhvbars(ctx: &mut FunctionContext) -> BuiltinResult {
    extreme_offset(ctx, true)
}

fn llvbars(ctx: &mut FunctionContext) -> BuiltinResult {
    extreme_offset(ctx, false)
}

/// `FINDHIGH(X, N, M, T)` looks at the window of `M` bars that ends `N`
/// bars ago and returns the `T`-th highest value in it.
fn ranked_extreme(ctx: &mut FunctionContext, highest: bool) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let skip = ctx.arg_int(1)?;
    let window = ctx.arg_int(2)?;
    let rank = ctx.arg_int(3)?;
    let bar = ctx.bar();

    let start = (bar - skip - window + 1).max(0);
    let end = bar - skip;

    let mut values = Vec::new();
    let mut i = start;
    while i <= end {
        if i >= 0 {
            let v = source.value_at(i);
            if !v.is_nan() {
                values.push(v);
            }
        }
        i += 1;
    }

    let value = if values.is_empty() || rank <= 0 || rank as usize > values.len() {
        f64::NAN
    } else {
        values.sort_by(|a, b| {
            let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            if highest {
                ord.reverse()
            } else {
                ord
            }
        });
        values[rank as usize - 1]
    };
    Ok(ctx.finish(value))
}

fn findhigh(ctx: &mut FunctionContext) -> BuiltinResult {
    ranked_extreme(ctx, true)
}

fn findlow(ctx: &mut FunctionContext) -> BuiltinResult {
    ranked_extreme(ctx, false)
}

/// Like [`ranked_extreme`] but returns how many bars back the ranked
/// extreme sits; ties prefer the older bar.
fn ranked_extreme_offset(ctx: &mut FunctionContext, highest: bool) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let skip = ctx.arg_int(1)?;
    let window = ctx.arg_int(2)?;
    let rank = ctx.arg_int(3)?;
    let bar = ctx.bar();

    let start = (bar - skip - window + 1).max(0);
    let end = bar - skip;

    let mut entries: Vec<(f64, i64)> = Vec::new();
    let mut i = start;
    while i <= end {
        if i >= 0 {
            let v = source.value_at(i);
            if !v.is_nan() {
                entries.push((v, i));
            }
        }
        i += 1;
    }

    let value = if entries.is_empty() || rank <= 0 || rank as usize > entries.len() {
        f64::NAN
    } else {
        entries.sort_by(|a, b| {
            let ord = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
            let ord = if highest { ord.reverse() } else { ord };
            ord.then(a.1.cmp(&b.1))
        });
        (bar - entries[rank as usize - 1].1) as f64
    };
    Ok(ctx.finish(value))
}

fn findhighbars(ctx: &mut FunctionContext) -> BuiltinResult {
    ranked_extreme_offset(ctx, true)
}

fn findlowbars(ctx: &mut FunctionContext) -> BuiltinResult {
    ranked_extreme_offset(ctx, false)
}
