//! The tagged runtime value.

use crate::error::ValueError;
use crate::series::{SeriesExt, SeriesRef};

/// A runtime value: constant-pool entry, operand-stack slot, or global slot.
///
/// Numbers and booleans coerce freely (`true` ↔ `1.0`, `false` ↔ `0.0`); a
/// double is falsy iff it is `0.0` or `NaN`. A series reference coerces to a
/// scalar by reading its value at the current bar, which is why the numeric
/// and boolean accessors take a bar index.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Empty slot / absent optional argument.
    #[default]
    None,
    Num(f64),
    Bool(bool),
    Str(String),
    Series(SeriesRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Num(_) => "number",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Series(_) => "series",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Numeric view of the value at `bar`. `None` reads as `NaN`.
    pub fn as_num(&self, bar: i64) -> Result<f64, ValueError> {
        match self {
            Value::None => Ok(f64::NAN),
            Value::Num(n) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Series(s) => Ok(s.value_at(bar)),
            Value::Str(_) => Err(ValueError::NotNumeric(self.type_name())),
        }
    }

    /// Truthiness at `bar`: non-zero and non-`NaN`.
    pub fn as_bool(&self, bar: i64) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::None => Ok(false),
            Value::Num(_) | Value::Series(_) => {
                let n = self.as_num(bar).map_err(|_| ValueError::NotBoolean(self.type_name()))?;
                Ok(n != 0.0 && !n.is_nan())
            }
            Value::Str(_) => Err(ValueError::NotBoolean(self.type_name())),
        }
    }

    pub fn as_series(&self) -> Result<SeriesRef, ValueError> {
        match self {
            Value::Series(s) => Ok(s.clone()),
            other => Err(ValueError::NotSeries(other.type_name())),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ValueError::NotString(other.type_name())),
        }
    }
}
