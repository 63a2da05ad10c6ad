//! Bar-data adapters.
//!
//! Adapters produce a [`BarTable`]: an ordered set of named columns of
//! doubles. Their whole contract with the core is [`BarTable::register_into`]
//! — the VM never learns where the data came from.
//!
//! Two formats ship with the driver:
//!
//! - CSV with a header row (`time,open,high,low,close,…`). Cells are plain
//!   numbers; `time`/`date` cells may also be ISO-ish timestamps, which are
//!   squashed to their digits (`2024-01-05` → `20240105`).
//! - JSON, either a column map `{"close": [1, 2]}` or a record list
//!   `[{"close": 1}, {"close": 2}]` (nulls and gaps become NaN).

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use klinec_vm::Vm;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {message}")]
    Malformed { path: String, message: String },

    #[error("{path}: invalid JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported data format: {path} (expected .csv or .json)")]
    UnknownFormat { path: String },
}

/// Ordered named columns of per-bar doubles.
#[derive(Debug, Default)]
pub struct BarTable {
    columns: IndexMap<String, Vec<f64>>,
}

impl BarTable {
    /// Longest column length; the VM executes this many bars.
    pub fn total_bars(&self) -> usize {
        self.columns.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Installs every column as a VM data series.
    pub fn register_into(&self, vm: &mut Vm) {
        for (name, data) in &self.columns {
            vm.register_series(name, data.clone());
        }
    }
}

/// Loads a [`BarTable`] from a path, picking the adapter by extension.
pub fn load_table(path: &Path) -> Result<BarTable, DataError> {
    let display = path.display().to_string();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => load_csv(path),
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_json(path),
        _ => Err(DataError::UnknownFormat { path: display }),
    }
}

fn read(path: &Path) -> Result<String, DataError> {
    fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn load_csv(path: &Path) -> Result<BarTable, DataError> {
    let text = read(path)?;
    let display = path.display().to_string();

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| DataError::Malformed {
        path: display.clone(),
        message: "empty file".to_string(),
    })?;

    let names: Vec<String> = header
        .split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let mut table = BarTable::default();
    for name in &names {
        table.columns.insert(name.clone(), Vec::new());
    }

    for (row, line) in lines.enumerate() {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();
        if cells.len() != names.len() {
            return Err(DataError::Malformed {
                path: display,
                message: format!(
                    "row {} has {} cells, header has {}",
                    row + 1,
                    cells.len(),
                    names.len()
                ),
            });
        }
        for (name, cell) in names.iter().zip(&cells) {
            let value = parse_cell(name, cell).ok_or_else(|| DataError::Malformed {
                path: path.display().to_string(),
                message: format!("row {}: cannot parse '{}' in column '{}'", row + 1, cell, name),
            })?;
            if let Some(column) = table.columns.get_mut(name) {
                column.push(value);
            }
        }
    }

    tracing::debug!(
        columns = table.columns.len(),
        bars = table.total_bars(),
        "csv data loaded"
    );
    Ok(table)
}

/// Numeric cell value. Timestamp columns additionally accept date-like text
/// by collapsing it to its digits.
fn parse_cell(column: &str, cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    if let Ok(v) = cell.parse::<f64>() {
        return Some(v);
    }
    if column == "time" || column == "date" {
        let digits: String = cell.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return digits.parse::<f64>().ok();
        }
    }
    None
}

fn load_json(path: &Path) -> Result<BarTable, DataError> {
    let text = read(path)?;
    let display = path.display().to_string();
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| DataError::Json {
            path: display.clone(),
            source,
        })?;

    let mut table = BarTable::default();
    match value {
        // {"close": [1, 2], "open": [...]}
        serde_json::Value::Object(columns) => {
            for (name, column) in columns {
                let serde_json::Value::Array(items) = column else {
                    return Err(DataError::Malformed {
                        path: display,
                        message: format!("column '{}' is not an array", name),
                    });
                };
                let data = items.iter().map(json_number).collect();
                table.columns.insert(name.to_ascii_lowercase(), data);
            }
        }
        // [{"close": 1}, {"close": 2}]
        serde_json::Value::Array(records) => {
            for (row, record) in records.iter().enumerate() {
                let serde_json::Value::Object(fields) = record else {
                    return Err(DataError::Malformed {
                        path: display,
                        message: format!("record {} is not an object", row),
                    });
                };
                for (name, field) in fields {
                    let column = table
                        .columns
                        .entry(name.to_ascii_lowercase())
                        .or_default();
                    column.resize(row, f64::NAN);
                    column.push(json_number(field));
                }
            }
            // Columns missing from trailing records still need padding.
            let bars = records.len();
            for column in table.columns.values_mut() {
                column.resize(bars, f64::NAN);
            }
        }
        _ => {
            return Err(DataError::Malformed {
                path: display,
                message: "expected a column map or a record list".to_string(),
            })
        }
    }

    tracing::debug!(
        columns = table.columns.len(),
        bars = table.total_bars(),
        "json data loaded"
    );
    Ok(table)
}

fn json_number(value: &serde_json::Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(ext: &str, contents: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", ext))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn csv_with_dates_and_numbers() {
        let path = temp_file(
            "csv",
            "time,open,close\n2024-01-01,1.0,1.5\n2024-01-02,1.5,2.0\n",
        );
        let table = load_table(&path).unwrap();
        assert_eq!(table.total_bars(), 2);
        let columns: Vec<_> = table.columns().collect();
        assert_eq!(columns[0].0, "time");
        assert_eq!(columns[0].1, &[20240101.0, 20240102.0]);
        assert_eq!(columns[2].1, &[1.5, 2.0]);
    }

    #[test]
    fn csv_with_ragged_rows_is_rejected() {
        let path = temp_file("csv", "open,close\n1.0\n");
        assert!(matches!(
            load_table(&path),
            Err(DataError::Malformed { .. })
        ));
    }

    #[test]
    fn csv_empty_cells_become_nan() {
        let path = temp_file("csv", "open,close\n,2.0\n");
        let table = load_table(&path).unwrap();
        let columns: Vec<_> = table.columns().collect();
        assert!(columns[0].1[0].is_nan());
    }

    #[test]
    fn json_column_map() {
        let path = temp_file("json", r#"{"close": [1, 2, null], "open": [0.5, 1, 2]}"#);
        let table = load_table(&path).unwrap();
        assert_eq!(table.total_bars(), 3);
        let close = table.columns().find(|(n, _)| *n == "close").unwrap().1;
        assert_eq!(close[1], 2.0);
        assert!(close[2].is_nan());
    }

    #[test]
    fn json_record_list_pads_missing_fields() {
        let path = temp_file(
            "json",
            r#"[{"close": 1}, {"close": 2, "open": 1.5}, {"open": 2.5}]"#,
        );
        let table = load_table(&path).unwrap();
        assert_eq!(table.total_bars(), 3);
        let open = table.columns().find(|(n, _)| *n == "open").unwrap().1;
        assert!(open[0].is_nan());
        assert_eq!(open[1], 1.5);
        let close = table.columns().find(|(n, _)| *n == "close").unwrap().1;
        assert!(close[2].is_nan());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let path = temp_file("txt", "whatever");
        assert!(matches!(
            load_table(&path),
            Err(DataError::UnknownFormat { .. })
        ));
    }
}
