//! Selection, crossing, and condition-window logic.

use klinec_util::{SeriesExt, Value};

use super::{add, stub, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "if", select);
    add(table, "ifc", stub);
    add(table, "iff", stub);
    add(table, "ifn", stub);
    add(table, "valuewhen", valuewhen);
    add(table, "cross", cross);
    add(table, "longcross", longcross);
    add(table, "every", every);
    add(table, "exist", exist);
    add(table, "last", last);
    add(table, "not", not);
    add(table, "isnull", isnull);
    add(table, "testskip", stub);
    add(table, "filter", filter);
    add(table, "tfilt", tfilt);
    add(table, "tfilter", tfilter);
    add(table, "nday", stub);
    add(table, "upnday", stub);
    add(table, "downnday", stub);
    add(table, "input.int", input_int);
}

/// `IF(COND, A, B)`: scalar select at the current bar.
fn select(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_bool(0)?;
    let when_true = ctx.arg_num(1)?;
    let when_false = ctx.arg_num(2)?;
    Ok(ctx.finish(if condition { when_true } else { when_false }))
}

/// Latches the source value whenever the condition holds, otherwise carries
/// the previously latched value forward.
fn valuewhen(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_bool(0)?;
    let source = ctx.arg_num(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let value = if condition {
        source
    } else if bar > 0 {
        result.value_at(bar - 1)
    } else {
        f64::NAN
    };
    Ok(ctx.finish(value))
}

/// Previous-bar value of an argument: its own history for a series, the
/// same scalar otherwise.
fn previous_of(ctx: &FunctionContext, index: usize, fallback: f64) -> Result<f64, crate::RuntimeErrorKind> {
    match ctx.arg(index)? {
        Value::Series(s) => Ok(s.value_at(ctx.bar() - 1)),
        _ => Ok(fallback),
    }
}

/// True when the two inputs crossed between the previous bar and this one,
/// in either direction.
fn cross(ctx: &mut FunctionContext) -> BuiltinResult {
    let a = ctx.arg_num(0)?;
    let b = ctx.arg_num(1)?;
    let prev_a = previous_of(ctx, 0, a)?;
    let prev_b = previous_of(ctx, 1, b)?;

    let mut crossed = false;
    if !a.is_nan() && !b.is_nan() && !prev_a.is_nan() && !prev_b.is_nan() {
        let up = a > b && prev_a <= prev_b;
        let down = a < b && prev_a >= prev_b;
        crossed = up || down;
    }
    Ok(ctx.finish(if crossed { 1.0 } else { 0.0 }))
}

/// Upward crossing only.
fn longcross(ctx: &mut FunctionContext) -> BuiltinResult {
    let a = ctx.arg_num(0)?;
    let b = ctx.arg_num(1)?;
    let prev_a = previous_of(ctx, 0, a)?;
    let prev_b = previous_of(ctx, 1, b)?;

    let mut crossed = false;
    if !a.is_nan() && !b.is_nan() && !prev_a.is_nan() && !prev_b.is_nan() {
        crossed = a > b && prev_a <= prev_b;
    }
    Ok(ctx.finish(if crossed { 1.0 } else { 0.0 }))
}

/// True when the condition held on every one of the last `length` bars;
/// false before the window has filled.
fn every(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = false;
    if bar >= length - 1 {
        value = true;
        for i in 0..length {
            let v = condition.value_at(bar - i);
            if v.is_nan() || v == 0.0 {
                value = false;
                break;
            }
        }
    }
    Ok(ctx.finish(if value { 1.0 } else { 0.0 }))
}

/// True when the condition held on any of the last `length` bars.
fn exist(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = false;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = condition.value_at(bar - i);
        if !v.is_nan() && v != 0.0 {
            value = true;
            break;
        }
    }
    Ok(ctx.finish(if value { 1.0 } else { 0.0 }))
}

/// `LAST(COND, A, B)`: the condition held on every bar from A bars ago to B
/// bars ago. A of 0 means "since the first bar", B of 0 means "until the
/// previous bar".
fn last(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let mut start = ctx.arg_int(1)?;
    let mut end = ctx.arg_int(2)?;
    let bar = ctx.bar();

    if start == 0 {
        start = bar;
    }
    if end == 0 {
        end = 1;
    }

    let mut value = true;
    let mut i = end;
    while i <= start {
        let checked = bar - i;
        if checked < 0 {
            value = false;
            break;
        }
        let v = condition.value_at(checked);
        if v.is_nan() || v == 0.0 {
            value = false;
            break;
        }
        i += 1;
    }
    Ok(ctx.finish(if value { 1.0 } else { 0.0 }))
}

fn not(ctx: &mut FunctionContext) -> BuiltinResult {
    let x = ctx.arg_num(0)?;
    let value = if x.is_nan() {
        f64::NAN
    } else if x == 0.0 {
        1.0
    } else {
        0.0
    };
    Ok(ctx.finish(value))
}

fn isnull(ctx: &mut FunctionContext) -> BuiltinResult {
    let x = ctx.arg_num(0)?;
    Ok(ctx.finish(if x.is_nan() { 1.0 } else { 0.0 }))
}

/// Suppresses signals that follow an earlier signal within `length` bars:
/// reads its own output for the lookback, so suppressed bars do not
/// themselves suppress.
fn filter(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let mut recently_fired = false;
    for i in 1..length {
        if bar - i < 0 {
            break;
        }
        let v = result.value_at(bar - i);
        if !v.is_nan() && v != 0.0 {
            recently_fired = true;
            break;
        }
    }
    let value = if recently_fired {
        0.0
    } else {
        condition.value_at(bar)
    };
    Ok(ctx.finish(value))
}

/// True when the condition held on every bar of the window reachable so far.
fn tfilt(ctx: &mut FunctionContext) -> BuiltinResult {
    let condition = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = true;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = condition.value_at(bar - i);
        if v.is_nan() || v == 0.0 {
            value = false;
            break;
        }
    }
    Ok(ctx.finish(if value { 1.0 } else { 0.0 }))
}

/// True when the condition held anywhere in the window.
fn tfilter(ctx: &mut FunctionContext) -> BuiltinResult {
    exist(ctx)
}

/// Script inputs evaluate to their default; the title is only metadata.
fn input_int(ctx: &mut FunctionContext) -> BuiltinResult {
    Ok(ctx.arg(0)?.clone())
}
