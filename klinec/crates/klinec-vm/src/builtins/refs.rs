//! History references, accumulation, and bar counting.

use klinec_util::SeriesExt;

use super::{add, stub, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "ref", reference);
    add(table, "refv", reference);
    add(table, "hod", reference);
    add(table, "lod", reference);
    add(table, "lowrange", reference);
    add(table, "refdate", stub);
    add(table, "reverse", reverse);
    add(table, "const", constant);
    add(table, "sum", sum);
    add(table, "sumbars", sum);
    add(table, "count", count);
    add(table, "mular", mular);
    add(table, "barscount", barscount);
    add(table, "barslast", barslast);
    add(table, "barssince", barssince);
    add(table, "barssincen", barssincen);
    add(table, "barsstatus", consecutive_true);
    add(table, "barslastcount", consecutive_true);
    add(table, "currbarscount", stub);
    add(table, "totalbarscount", totalbarscount);
    add(table, "islastbar", islastbar);
}

/// `REF(X, K)`: the value of X, K bars ago. NaN before bar K.
fn reference(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let offset = ctx.arg_int(1)?;
    let bar = ctx.bar();
    Ok(ctx.finish(source.value_at(bar - offset)))
}

/// Pass-through of the current bar.
fn reverse(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let bar = ctx.bar();
    Ok(ctx.finish(source.value_at(bar)))
}

/// Materializes a scalar as a series.
fn constant(ctx: &mut FunctionContext) -> BuiltinResult {
    let value = ctx.arg_num(0)?;
    Ok(ctx.finish(value))
}

/// Sum over the full window; NaN until the window fills.
fn sum(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut total = 0.0;
    let mut non_nan = 0i64;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = source.value_at(bar - i);
        if !v.is_nan() {
            total += v;
            non_nan += 1;
        }
    }
    let value = if non_nan == length { total } else { f64::NAN };
    Ok(ctx.finish(value))
}

/// How many of the last `length` bars were truthy.
fn count(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut hits = 0i64;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = condition.value_at(bar - i);
        if !v.is_nan() && v != 0.0 {
            hits += 1;
        }
    }
    Ok(ctx.finish(hits as f64))
}

/// Product over the window; `length == 0` multiplies from the first bar.
fn mular(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let start = if length == 0 { 0 } else { bar - length + 1 };
    let mut product = 1.0;
    let mut broken = start < 0;
    if !broken {
        let mut i = start;
        while i <= bar {
            let v = source.value_at(i);
            if v.is_nan() {
                broken = true;
                break;
            }
            product *= v;
            i += 1;
        }
    }
    Ok(ctx.finish(if broken { f64::NAN } else { product }))
}

/// Count of non-NaN bars from the start of data to here.
fn barscount(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let bar = ctx.bar();

    let mut hits = 0i64;
    for i in 0..=bar {
        if !source.value_at(i).is_nan() {
            hits += 1;
        }
    }
    Ok(ctx.finish(hits as f64))
}

/// Bars since the condition last held: 0 when it holds now, NaN if never.
fn barslast(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let bar = ctx.bar();

    let mut value = f64::NAN;
    for i in 0..=bar {
        let v = condition.value_at(bar - i);
        if !v.is_nan() && v != 0.0 {
            value = i as f64;
            break;
        }
    }
    Ok(ctx.finish(value))
}

/// Same offset as `barslast`, but reports -1 instead of NaN when the
/// condition has never held.
fn barssince(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let bar = ctx.bar();

    let mut value = -1i64;
    for i in 0..=bar {
        let v = condition.value_at(bar - i);
        if !v.is_nan() && v != 0.0 {
            value = i;
            break;
        }
    }
    Ok(ctx.finish(value as f64))
}

/// Offset of the `n`-th most recent truthy bar (or of the oldest truthy
/// bar when fewer than `n` exist); -1 when the condition never held.
fn barssincen(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let wanted = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = -1i64;
    let mut seen = 0i64;
    for i in 0..=bar {
        let v = condition.value_at(bar - i);
        if !v.is_nan() && v != 0.0 {
            value = i;
            seen += 1;
            if seen >= wanted {
                break;
            }
        }
    }
    Ok(ctx.finish(value as f64))
}

/// Length of the unbroken run of truthy bars ending here.
fn consecutive_true(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let bar = ctx.bar();

    let mut run = 0i64;
    let mut i = bar;
    while i >= 0 {
        let v = condition.value_at(i);
        if !v.is_nan() && v != 0.0 {
            run += 1;
        } else {
            break;
        }
        i -= 1;
    }
    Ok(ctx.finish(run as f64))
}

fn totalbarscount(ctx: &mut FunctionContext) -> BuiltinResult {
    let total = ctx.total_bars();
    Ok(ctx.finish(total as f64))
}

fn islastbar(ctx: &mut FunctionContext) -> BuiltinResult {
    let last = ctx.bar() == ctx.total_bars() - 1;
    Ok(ctx.finish(if last { 1.0 } else { 0.0 }))
}
