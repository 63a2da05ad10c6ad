//! Bar-indexed data series.

use std::cell::RefCell;
use std::rc::Rc;

/// A named, growable sequence of doubles indexed by bar.
///
/// Reads outside the written range yield `NaN`; writes past the end grow the
/// vector with `NaN` padding. `NaN` is the universal "no value" marker, never
/// an error.
///
/// # Example
///
/// ```
/// use klinec_util::Series;
///
/// let mut s = Series::new("close");
/// s.set(2, 10.5);
/// assert_eq!(s.len(), 3);
/// assert!(s.get(0).is_nan());
/// assert_eq!(s.get(2), 10.5);
/// assert!(s.get(-1).is_nan());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Series {
    name: String,
    data: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Series {
            name: name.into(),
            data: Vec::new(),
        }
    }

    pub fn from_data(name: impl Into<String>, data: Vec<f64>) -> Self {
        Series {
            name: name.into(),
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at `bar`, or `NaN` when `bar` lies outside the written range.
    pub fn get(&self, bar: i64) -> f64 {
        if bar < 0 {
            return f64::NAN;
        }
        self.data.get(bar as usize).copied().unwrap_or(f64::NAN)
    }

    /// Writes `value` at `bar`, padding any gap with `NaN`.
    ///
    /// Negative bars are unwritable and ignored.
    pub fn set(&mut self, bar: i64, value: f64) {
        if bar < 0 {
            return;
        }
        let bar = bar as usize;
        if bar >= self.data.len() {
            self.data.resize(bar + 1, f64::NAN);
        }
        self.data[bar] = value;
    }

    /// Appends one bar at the end (incremental data feed).
    pub fn push(&mut self, value: f64) {
        self.data.push(value);
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Shared-ownership handle to a [`Series`].
///
/// One series object may live in a global slot, in the builtin result cache,
/// and on the operand stack at the same time; `Rc::ptr_eq` on the handle is
/// the owner identity used to deduplicate plot registrations. Series carry
/// only data, never references to other series, so cycles cannot form.
pub type SeriesRef = Rc<RefCell<Series>>;

pub fn new_series_ref(series: Series) -> SeriesRef {
    Rc::new(RefCell::new(series))
}

/// Borrow-free convenience accessors on [`SeriesRef`].
pub trait SeriesExt {
    fn value_at(&self, bar: i64) -> f64;
    fn set_at(&self, bar: i64, value: f64);
    fn series_name(&self) -> String;
    fn series_len(&self) -> usize;
}

impl SeriesExt for SeriesRef {
    fn value_at(&self, bar: i64) -> f64 {
        self.borrow().get(bar)
    }

    fn set_at(&self, bar: i64, value: f64) {
        self.borrow_mut().set(bar, value);
    }

    fn series_name(&self) -> String {
        self.borrow().name().to_string()
    }

    fn series_len(&self) -> usize {
        self.borrow().len()
    }
}
