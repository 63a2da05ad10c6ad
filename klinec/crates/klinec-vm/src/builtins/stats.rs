//! Windowed statistics.

use klinec_util::SeriesExt;

use super::{add, stub, window_values, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "avedev", avedev);
    add(table, "devsq", devsq);
    add(table, "std", std_sample);
    add(table, "stddev", std_sample);
    add(table, "stdp", std_population);
    add(table, "var", var_sample);
    add(table, "varp", var_population);
    add(table, "covar", covar);
    add(table, "slope", slope);
    add(table, "beta", stub);
    add(table, "betax", stub);
    add(table, "forcast", stub);
    add(table, "relate", stub);
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean absolute deviation over whatever part of the window exists.
fn avedev(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let values = window_values(&source, ctx.bar(), length);

    let value = if values.is_empty() {
        f64::NAN
    } else {
        let m = mean(&values);
        values.iter().map(|v| (v - m).abs()).sum::<f64>() / values.len() as f64
    };
    Ok(ctx.finish(value))
}

/// Sum of squared deviations from the window mean.
fn devsq(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let values = window_values(&source, ctx.bar(), length);

    let value = if values.is_empty() {
        f64::NAN
    } else {
        let m = mean(&values);
        values.iter().map(|v| (v - m) * (v - m)).sum()
    };
    Ok(ctx.finish(value))
}

/// Squared deviations over a full window, divided by `denominator`.
fn spread(values: &[f64], length: i64, denominator: f64) -> f64 {
    if values.len() as i64 != length || denominator <= 0.0 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / denominator
}

fn std_sample(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let values = window_values(&source, ctx.bar(), length);
    Ok(ctx.finish(spread(&values, length, (values.len() as f64) - 1.0).sqrt()))
}

fn std_population(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let values = window_values(&source, ctx.bar(), length);
    Ok(ctx.finish(spread(&values, length, values.len() as f64).sqrt()))
}

fn var_sample(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let values = window_values(&source, ctx.bar(), length);
    Ok(ctx.finish(spread(&values, length, (values.len() as f64) - 1.0)))
}

fn var_population(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let values = window_values(&source, ctx.bar(), length);
    Ok(ctx.finish(spread(&values, length, values.len() as f64)))
}

/// Sample covariance of two sources over a full window.
fn covar(ctx: &mut FunctionContext) -> BuiltinResult {
    let first = ctx.arg_series(0)?;
    let second = ctx.arg_series(1)?;
    let length = ctx.arg_int(2)?;
    let bar = ctx.bar();

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut count = 0i64;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let x = first.value_at(bar - i);
        let y = second.value_at(bar - i);
        if !x.is_nan() && !y.is_nan() {
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            count += 1;
        }
    }

    let value = if count == length && count > 1 {
        let n = count as f64;
        let mean_x = sum_x / n;
        let mean_y = sum_y / n;
        (sum_xy - n * mean_x * mean_y) / (n - 1.0)
    } else {
        f64::NAN
    };
    Ok(ctx.finish(value))
}

/// Least-squares slope of the source against bar position over the window.
fn slope(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = f64::NAN;
    if bar >= length - 1 {
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_x2 = 0.0;
        let mut n = 0i64;
        for i in 0..length {
            let y = source.value_at(bar - i);
            if !y.is_nan() {
                let x = (length - 1 - i) as f64;
                sum_x += x;
                sum_y += y;
                sum_xy += x * y;
                sum_x2 += x * x;
                n += 1;
            }
        }
        if n == length && n > 1 {
            let nf = n as f64;
            let denominator = nf * sum_x2 - sum_x * sum_x;
            if denominator != 0.0 {
                value = (nf * sum_xy - sum_x * sum_y) / denominator;
            }
        }
    }
    Ok(ctx.finish(value))
}
