//! Moving averages and recursive smoothers.
//!
//! The recursive family (`ema`, `dma`, `ama`, `mema`, `xma`) reads its own
//! previous output from the result series, which is exactly the cross-bar
//! memory the builtin cache provides.

use klinec_util::SeriesExt;

use super::{add, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "ma", ma);
    add(table, "sma", sma);
    add(table, "ta.sma", ta_sma);
    add(table, "wma", wma);
    add(table, "tma", tma);
    add(table, "ema", ema);
    add(table, "expma", ema);
    add(table, "ta.ema", ema);
    add(table, "expmema", expmema);
    add(table, "mema", mema);
    add(table, "xma", xma);
    add(table, "dma", dma);
    add(table, "ama", ama);
    add(table, "ta.rsi", ta_rsi);
}

/// Mean of the source over the full window; NaN until `length` non-NaN
/// values are available.
fn ma(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut sum = 0.0;
    let mut count = 0i64;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = source.value_at(bar - i);
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    let value = if count > 0 && count == length {
        sum / count as f64
    } else {
        f64::NAN
    };
    Ok(ctx.finish(value))
}

/// `SMA(X, N, M)`: the weight argument is accepted but ignored, matching
/// the common charting-platform behaviour of treating it as a plain mean.
fn sma(ctx: &mut FunctionContext) -> BuiltinResult {
    ma(ctx)
}

/// Pine-style SMA: averages whatever part of the window exists, so early
/// bars produce partial means instead of NaN.
fn ta_sma(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut sum = 0.0;
    let mut count = 0i64;
    for i in 0..length {
        if bar - i < 0 {
            break;
        }
        let v = source.value_at(bar - i);
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    let value = if count > 0 { sum / count as f64 } else { f64::NAN };
    Ok(ctx.finish(value))
}

/// Linear-weighted mean: the newest bar weighs `length`, the oldest 1.
fn wma(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = f64::NAN;
    if bar >= length - 1 && length > 0 {
        let mut weighted = 0.0;
        let mut weights = 0.0;
        let mut has_nan = false;
        for i in 0..length {
            let v = source.value_at(bar - i);
            if v.is_nan() {
                has_nan = true;
                break;
            }
            let w = (length - i) as f64;
            weighted += v * w;
            weights += w;
        }
        if !has_nan && weights > 0.0 {
            value = weighted / weights;
        }
    }
    Ok(ctx.finish(value))
}

/// Triangular average: an SMA of SMAs.
fn tma(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();

    let mut value = f64::NAN;
    if length > 0 && bar >= length * 2 - 2 {
        let mut outer_sum = 0.0;
        let mut outer_count = 0i64;
        for i in 0..length {
            let mut inner_sum = 0.0;
            let mut inner_count = 0i64;
            for j in 0..length {
                let v = source.value_at(bar - i - j);
                if !v.is_nan() {
                    inner_sum += v;
                    inner_count += 1;
                }
            }
            if inner_count == length {
                outer_sum += inner_sum / length as f64;
                outer_count += 1;
            } else {
                outer_count = 0;
                break;
            }
        }
        if outer_count == length {
            value = outer_sum / length as f64;
        }
    }
    Ok(ctx.finish(value))
}

/// Exponential average seeded with the first value:
/// `y = (2x + (n-1)·prev) / (n+1)`.
fn ema(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_num(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let current = source.value_at(bar);
    let prev = result.value_at(bar - 1);

    let value = if current.is_nan() {
        f64::NAN
    } else if prev.is_nan() {
        current
    } else {
        (current * 2.0 + prev * (length - 1.0)) / (length + 1.0)
    };
    Ok(ctx.finish(value))
}

/// Exponential average that stays NaN for the first `n-1` bars and seeds
/// with a full-window SMA.
fn expmema(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let value = if bar < length - 1 {
        f64::NAN
    } else {
        let current = source.value_at(bar);
        let prev = result.value_at(bar - 1);
        if current.is_nan() {
            f64::NAN
        } else if prev.is_nan() {
            let mut sum = 0.0;
            let mut count = 0i64;
            for i in 0..length {
                let v = source.value_at(bar - i);
                if !v.is_nan() {
                    sum += v;
                    count += 1;
                }
            }
            if count == length {
                sum / count as f64
            } else {
                f64::NAN
            }
        } else {
            (current * 2.0 + prev * (length as f64 - 1.0)) / (length as f64 + 1.0)
        }
    };
    Ok(ctx.finish(value))
}

/// Modified average `y = (x + (n-1)·prev) / n`, SMA-seeded.
fn mema(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let current = source.value_at(bar);
    let prev = result.value_at(bar - 1);

    let value = if current.is_nan() {
        f64::NAN
    } else if prev.is_nan() {
        let mut sum = 0.0;
        let mut count = 0i64;
        for i in 0..length {
            if bar - i < 0 {
                break;
            }
            let v = source.value_at(bar - i);
            if !v.is_nan() {
                sum += v;
                count += 1;
            }
        }
        if count == length {
            sum / length as f64
        } else {
            f64::NAN
        }
    } else {
        (current + prev * (length as f64 - 1.0)) / length as f64
    };
    Ok(ctx.finish(value))
}

/// Like `mema` but seeded with the current value instead of an SMA.
fn xma(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_num(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let current = source.value_at(bar);
    let prev = result.value_at(bar - 1);

    let value = if current.is_nan() {
        f64::NAN
    } else if prev.is_nan() {
        current
    } else {
        (current + prev * (length - 1.0)) / length
    };
    Ok(ctx.finish(value))
}

/// Dynamic average `y = a·x + (1-a)·prev` with a fixed smoothing factor.
fn dma(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let alpha = ctx.arg_num(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let current = source.value_at(bar);
    let prev = result.value_at(bar - 1);

    let value = if current.is_nan() {
        f64::NAN
    } else if prev.is_nan() {
        current
    } else {
        alpha * current + (1.0 - alpha) * prev
    };
    Ok(ctx.finish(value))
}

/// Adaptive average `y = prev + a·(x - prev)`.
fn ama(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let alpha = ctx.arg_num(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let current = source.value_at(bar);
    let prev = result.value_at(bar - 1);

    let value = if current.is_nan() {
        f64::NAN
    } else if prev.is_nan() {
        current
    } else {
        prev + alpha * (current - prev)
    };
    Ok(ctx.finish(value))
}

/// Wilder RSI with SMA seeding of the running gain/loss averages. The two
/// running averages live in auxiliary cache series keyed off the source.
fn ta_rsi(ctx: &mut FunctionContext) -> BuiltinResult {
    let source = ctx.arg_series(0)?;
    let length = ctx.arg_int(1)?;
    let bar = ctx.bar();
    let result = ctx.result();

    let src_name = source.series_name();
    let gains = ctx.aux_series(format!("__rsi_avg_gain({}~{})", src_name, length));
    let losses = ctx.aux_series(format!("__rsi_avg_loss({}~{})", src_name, length));

    if bar == 0 {
        gains.set_at(bar, f64::NAN);
        losses.set_at(bar, f64::NAN);
        return Ok(ctx.finish(f64::NAN));
    }

    let current = source.value_at(bar);
    let previous = source.value_at(bar - 1);
    if current.is_nan() || previous.is_nan() {
        gains.set_at(bar, f64::NAN);
        losses.set_at(bar, f64::NAN);
        return Ok(ctx.finish(f64::NAN));
    }

    let change = current - previous;
    let gain = change.max(0.0);
    let loss = (-change).max(0.0);

    let prev_avg_gain = gains.value_at(bar - 1);
    let (avg_gain, avg_loss) = if prev_avg_gain.is_nan() {
        // Seed both averages with a simple mean over the window.
        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut count = 0i64;
        for i in 0..length {
            if bar - i <= 0 {
                break;
            }
            let a = source.value_at(bar - i);
            let b = source.value_at(bar - i - 1);
            if !a.is_nan() && !b.is_nan() {
                let c = a - b;
                gain_sum += c.max(0.0);
                loss_sum += (-c).max(0.0);
                count += 1;
            }
        }
        if count == length {
            (gain_sum / length as f64, loss_sum / length as f64)
        } else {
            (gain, if loss > 0.0 { loss } else { 0.0001 })
        }
    } else {
        let prev_avg_loss = losses.value_at(bar - 1);
        (
            (prev_avg_gain * (length as f64 - 1.0) + gain) / length as f64,
            (prev_avg_loss * (length as f64 - 1.0) + loss) / length as f64,
        )
    };

    gains.set_at(bar, avg_gain);
    losses.set_at(bar, avg_loss);

    let value = if avg_gain.is_nan() || avg_loss.is_nan() {
        f64::NAN
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    };
    Ok(ctx.finish(value))
}
