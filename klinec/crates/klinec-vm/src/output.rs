//! CSV rendering of plotted results.

use std::io::{self, Write};

use klinec_util::SeriesExt;

use crate::Vm;

impl Vm {
    /// Renders plotted series as CSV: a `time` column when a `time` series
    /// is registered, then one column per plot in registration order.
    /// Values use fixed `precision`; `NaN` and missing cells stay empty.
    pub fn plotted_results_as_csv(&self, precision: usize) -> String {
        let mut out = Vec::new();
        // Writing to a Vec<u8> cannot fail.
        let _ = self.write_plotted_results(&mut out, precision);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Streams the CSV form of [`Vm::plotted_results_as_csv`].
    pub fn write_plotted_results(
        &self,
        writer: &mut dyn Write,
        precision: usize,
    ) -> io::Result<()> {
        if self.plotted.is_empty() {
            return Ok(());
        }

        let time = self.builtin_vars.get("time");

        let mut first = true;
        if time.is_some() {
            write!(writer, "time")?;
            first = false;
        }
        for plotted in &self.plotted {
            if !first {
                write!(writer, ",")?;
            }
            write!(writer, "{}", plotted.series.series_name())?;
            first = false;
        }
        writeln!(writer)?;

        let mut rows = self
            .plotted
            .iter()
            .map(|p| p.series.series_len())
            .max()
            .unwrap_or(0);
        if let Some(time) = time {
            rows = rows.max(time.series_len());
        }

        for row in 0..rows {
            let mut first = true;
            if let Some(time) = time {
                let t = time.value_at(row as i64);
                if !t.is_nan() {
                    // Timestamps print without decimals.
                    write!(writer, "{:.0}", t)?;
                }
                first = false;
            }
            for plotted in &self.plotted {
                if !first {
                    write!(writer, ",")?;
                }
                let v = plotted.series.value_at(row as i64);
                if !v.is_nan() {
                    write!(writer, "{:.*}", precision, v)?;
                }
                first = false;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}
