//! The builtin invocation context.

use klinec_util::{new_series_ref, Series, SeriesExt, SeriesRef, Value, ValueError};
use rustc_hash::FxHashMap;

use crate::RuntimeErrorKind;

/// Safe, isolated execution context handed to a builtin function.
///
/// Arguments have already been popped off the VM stack, so a builtin cannot
/// unbalance the machine; the result series comes from the VM cache, so the
/// values a builtin wrote on earlier bars are its memory.
pub struct FunctionContext<'vm> {
    args: Vec<Value>,
    result: SeriesRef,
    bar: i64,
    total_bars: i64,
    builtin_vars: &'vm FxHashMap<String, SeriesRef>,
    cache: &'vm mut FxHashMap<String, SeriesRef>,
}

impl<'vm> FunctionContext<'vm> {
    pub(crate) fn new(
        args: Vec<Value>,
        result: SeriesRef,
        bar: i64,
        total_bars: i64,
        builtin_vars: &'vm FxHashMap<String, SeriesRef>,
        cache: &'vm mut FxHashMap<String, SeriesRef>,
    ) -> Self {
        FunctionContext {
            args,
            result,
            bar,
            total_bars,
            builtin_vars,
            cache,
        }
    }

    /// Number of arguments actually supplied (padding already trimmed).
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn arg(&self, index: usize) -> Result<&Value, RuntimeErrorKind> {
        self.args.get(index).ok_or(RuntimeErrorKind::BadArgument {
            index,
            count: self.args.len(),
        })
    }

    /// Argument as a scalar at the current bar.
    pub fn arg_num(&self, index: usize) -> Result<f64, RuntimeErrorKind> {
        Ok(self.arg(index)?.as_num(self.bar)?)
    }

    /// Argument as a truncated integer (window lengths, offsets, ranks).
    pub fn arg_int(&self, index: usize) -> Result<i64, RuntimeErrorKind> {
        Ok(self.arg_num(index)? as i64)
    }

    /// Argument truthiness at the current bar.
    pub fn arg_bool(&self, index: usize) -> Result<bool, RuntimeErrorKind> {
        Ok(self.arg(index)?.as_bool(self.bar)?)
    }

    /// Argument as a series. A scalar argument is lifted into a cached
    /// constant series (written at each executed bar), so window functions
    /// accept literals: `count(1, 5)` counts five ones.
    pub fn arg_series(&mut self, index: usize) -> Result<SeriesRef, RuntimeErrorKind> {
        let value = self.arg(index)?.clone();
        match value {
            Value::Series(series) => Ok(series),
            Value::Num(_) | Value::Bool(_) => {
                let n = value.as_num(self.bar)?;
                let label = format!("{}", n);
                let series = self.aux_series(format!("const({})", label));
                series.set_at(self.bar, n);
                Ok(series)
            }
            other => Err(ValueError::NotSeries(other.type_name()).into()),
        }
    }

    /// Bar currently being computed.
    pub fn bar(&self) -> i64 {
        self.bar
    }

    pub fn total_bars(&self) -> i64 {
        self.total_bars
    }

    /// The cached series this invocation should write into.
    pub fn result(&self) -> SeriesRef {
        self.result.clone()
    }

    /// Writes `value` into the result series at the current bar.
    pub fn write(&self, value: f64) {
        self.result.set_at(self.bar, value);
    }

    /// Writes `value` and returns the result series, the common tail of
    /// almost every builtin body.
    pub fn finish(&self, value: f64) -> Value {
        self.write(value);
        Value::Series(self.result())
    }

    /// A host-registered data series (`close`, `time`, …).
    pub fn builtin_var(&self, name: &str) -> Option<SeriesRef> {
        self.builtin_vars.get(name).cloned()
    }

    /// Get-or-create an auxiliary cache series, for builtins that need
    /// state beyond their result (e.g. RSI's running gain/loss averages).
    pub fn aux_series(&mut self, key: String) -> SeriesRef {
        self.cache
            .entry(key.clone())
            .or_insert_with(|| new_series_ref(Series::new(key)))
            .clone()
    }
}
