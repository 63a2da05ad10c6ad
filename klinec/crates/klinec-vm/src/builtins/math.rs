//! Scalar math. NaN flows through every function unchanged.

use super::{add, BuiltinResult, Table};
use crate::context::FunctionContext;

pub(crate) fn register(table: &mut Table) {
    add(table, "abs", abs);
    add(table, "acos", acos);
    add(table, "asin", asin);
    add(table, "atan", atan);
    add(table, "ceil", ceil);
    add(table, "ceiling", ceil);
    add(table, "cos", cos);
    add(table, "exp", exp);
    add(table, "floor", floor);
    add(table, "facepart", facepart);
    add(table, "intpart", facepart);
    add(table, "ln", ln);
    add(table, "log", log);
    add(table, "sin", sin);
    add(table, "sqrt", sqrt);
    add(table, "tan", tan);
    add(table, "sign", sign);
    add(table, "max", max);
    add(table, "min", min);
    add(table, "mod", modulo);
    add(table, "pow", pow);
    add(table, "round", round);
    add(table, "round2", round2);
    add(table, "rand", rand_fn);
    add(table, "between", between);
    add(table, "range", range);
}

macro_rules! unary_fn {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            fn $name(ctx: &mut FunctionContext) -> BuiltinResult {
                let x = ctx.arg_num(0)?;
                Ok(ctx.finish(x.$method()))
            }
        )*
    };
}

unary_fn! {
    abs => abs,
    acos => acos,
    asin => asin,
    atan => atan,
    ceil => ceil,
    cos => cos,
    exp => exp,
    floor => floor,
    // Integer part, truncated toward zero.
    facepart => trunc,
    ln => ln,
    log => log10,
    sin => sin,
    sqrt => sqrt,
    tan => tan,
}

fn sign(ctx: &mut FunctionContext) -> BuiltinResult {
    let x = ctx.arg_num(0)?;
    let value = if x.is_nan() {
        f64::NAN
    } else if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    };
    Ok(ctx.finish(value))
}

fn max(ctx: &mut FunctionContext) -> BuiltinResult {
    let a = ctx.arg_num(0)?;
    let b = ctx.arg_num(1)?;
    let value = if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    };
    Ok(ctx.finish(value))
}

fn min(ctx: &mut FunctionContext) -> BuiltinResult {
    let a = ctx.arg_num(0)?;
    let b = ctx.arg_num(1)?;
    let value = if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    };
    Ok(ctx.finish(value))
}

/// Integer remainder; NaN on NaN input or a zero divisor.
fn modulo(ctx: &mut FunctionContext) -> BuiltinResult {
    let dividend = ctx.arg_num(0)?;
    let divisor = ctx.arg_num(1)?;
    let value = if dividend.is_nan() || divisor.is_nan() || divisor == 0.0 {
        f64::NAN
    } else {
        ((dividend as i64) % (divisor as i64)) as f64
    };
    Ok(ctx.finish(value))
}

fn pow(ctx: &mut FunctionContext) -> BuiltinResult {
    let base = ctx.arg_num(0)?;
    let exponent = ctx.arg_num(1)?;
    Ok(ctx.finish(base.powf(exponent)))
}

/// `ROUND(X)` rounds to the nearest integer; `ROUND(X, D)` to `D` decimals.
fn round(ctx: &mut FunctionContext) -> BuiltinResult {
    let x = ctx.arg_num(0)?;
    let value = if x.is_nan() {
        f64::NAN
    } else if ctx.arg_count() == 2 {
        let decimals = ctx.arg_int(1)?;
        let factor = 10f64.powi(decimals as i32);
        (x * factor).round() / factor
    } else {
        x.round()
    };
    Ok(ctx.finish(value))
}

fn round2(ctx: &mut FunctionContext) -> BuiltinResult {
    let x = ctx.arg_num(0)?;
    let decimals = ctx.arg_int(1)?;
    let value = if x.is_nan() {
        f64::NAN
    } else {
        let factor = 10f64.powi(decimals as i32);
        (x * factor).round() / factor
    };
    Ok(ctx.finish(value))
}

fn rand_fn(ctx: &mut FunctionContext) -> BuiltinResult {
    Ok(ctx.finish(rand::random::<f64>()))
}

/// 1 when `lo <= x <= hi`; NaN when any input is NaN.
fn between(ctx: &mut FunctionContext) -> BuiltinResult {
    let x = ctx.arg_num(0)?;
    let lo = ctx.arg_num(1)?;
    let hi = ctx.arg_num(2)?;
    let value = if x.is_nan() || lo.is_nan() || hi.is_nan() {
        f64::NAN
    } else if x >= lo && x <= hi {
        1.0
    } else {
        0.0
    };
    Ok(ctx.finish(value))
}

/// 1 when `b < a < c`, strictly.
fn range(ctx: &mut FunctionContext) -> BuiltinResult {
    let a = ctx.arg_num(0)?;
    let b = ctx.arg_num(1)?;
    let c = ctx.arg_num(2)?;
    Ok(ctx.finish(if a > b && a < c { 1.0 } else { 0.0 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use klinec_util::{SeriesExt, Value};
    use rustc_hash::FxHashMap;

    fn call(func: crate::BuiltinFn, args: Vec<Value>) -> f64 {
        let vars = FxHashMap::default();
        let mut cache = FxHashMap::default();
        let result = klinec_util::new_series_ref(klinec_util::Series::new("r"));
        let mut ctx = FunctionContext::new(args, result, 0, 1, &vars, &mut cache);
        let out = func(&mut ctx).unwrap();
        match out {
            Value::Series(s) => s.value_at(0),
            Value::Num(n) => n,
            other => panic!("unexpected builtin result {:?}", other),
        }
    }

    #[test]
    fn round_with_and_without_decimals() {
        assert_eq!(call(round, vec![Value::Num(3.5)]), 4.0);
        assert_eq!(call(round, vec![Value::Num(3.456), Value::Num(2.0)]), 3.46);
    }

    #[test]
    fn modulo_guards_zero_divisor() {
        assert_eq!(call(modulo, vec![Value::Num(10.0), Value::Num(3.0)]), 1.0);
        assert!(call(modulo, vec![Value::Num(10.0), Value::Num(0.0)]).is_nan());
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(call(sign, vec![Value::Num(-100.0)]), -1.0);
        assert_eq!(call(sign, vec![Value::Num(0.0)]), 0.0);
        assert!(call(sign, vec![Value::Num(f64::NAN)]).is_nan());
    }

    #[test]
    fn nan_propagates_through_max_min() {
        assert!(call(max, vec![Value::Num(f64::NAN), Value::Num(1.0)]).is_nan());
        assert_eq!(call(min, vec![Value::Num(10.0), Value::Num(12.0)]), 10.0);
    }

    #[test]
    fn between_is_inclusive() {
        let v = call(
            between,
            vec![Value::Num(10.0), Value::Num(9.0), Value::Num(10.0)],
        );
        assert_eq!(v, 1.0);
    }
}
