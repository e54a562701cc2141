//! CSV rows as records.
//!
//! Cells are typed the way a dataframe reader would type them: integers, then
//! floats, then strings. Empty cells become `null` unless a fill value is set.

use crate::io::compression::auto_detect_reader;
use crate::record::Record;
use anyhow::{Context, Result, bail};
use serde_json::{Number, Value};
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Clone, Debug)]
pub struct CsvOptions {
    /// First row holds column names.
    pub has_headers: bool,
    /// Column names for headerless files. Overrides the header row when both are set.
    pub column_names: Option<Vec<String>>,
    pub delimiter: u8,
    /// Replacement for empty cells.
    pub fill_empty: Option<Value>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_headers: true,
            column_names: None,
            delimiter: b',',
            fill_empty: None,
        }
    }
}

/// Type one CSV cell.
#[must_use]
pub fn infer_value(cell: &str) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = cell.parse::<f64>()
        && let Some(n) = Number::from_f64(f)
    {
        return Some(Value::Number(n));
    }
    Some(Value::String(cell.to_string()))
}

/// Parse CSV from `reader`; `label` names the input in errors.
///
/// # Errors
/// Fails on malformed rows, rows whose width differs from the header, and
/// headerless input without column names.
pub fn parse_csv_records(reader: impl Read, opts: &CsvOptions, label: &str) -> Result<Vec<Record>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(opts.has_headers)
        .delimiter(opts.delimiter)
        .from_reader(reader);
    let columns: Vec<String> = match (&opts.column_names, opts.has_headers) {
        (Some(names), _) => names.clone(),
        (None, true) => rdr
            .headers()
            .with_context(|| format!("read CSV header in {label}"))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect(),
        (None, false) => bail!("{label}: headerless CSV needs column names"),
    };

    let mut out = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("parse CSV record #{} in {label}", i + 1))?;
        if row.len() != columns.len() {
            bail!(
                "{label}: record #{} has {} fields, expected {}",
                i + 1,
                row.len(),
                columns.len()
            );
        }
        let record: Record = columns
            .iter()
            .zip(row.iter())
            .map(|(col, cell)| {
                let v = infer_value(cell)
                    .or_else(|| opts.fill_empty.clone())
                    .unwrap_or(Value::Null);
                (col.clone(), v)
            })
            .collect();
        out.push(record);
    }
    Ok(out)
}

/// Read a (possibly compressed) CSV file into records.
///
/// # Errors
/// Fails when the file cannot be opened or parsed.
pub fn read_csv_records(path: impl AsRef<Path>, opts: &CsvOptions) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    parse_csv_records(rdr, opts, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_cell_types() {
        assert_eq!(infer_value(" 42 "), Some(json!(42)));
        assert_eq!(infer_value("-1.5"), Some(json!(-1.5)));
        assert_eq!(infer_value("Private"), Some(json!("Private")));
        assert_eq!(infer_value(""), None);
    }

    #[test]
    fn headerless_rows_use_given_names() {
        let opts = CsvOptions {
            has_headers: false,
            column_names: Some(vec!["a".into(), "b".into()]),
            ..CsvOptions::default()
        };
        let rows = parse_csv_records("1,x\n2,\n".as_bytes(), &opts, "mem").unwrap();
        assert_eq!(rows[0]["b"], json!("x"));
        assert_eq!(rows[1]["b"], Value::Null);
    }

    #[test]
    fn fill_value_replaces_empty_cells() {
        let opts = CsvOptions {
            fill_empty: Some(json!("NAN")),
            ..CsvOptions::default()
        };
        let rows = parse_csv_records("age,class\n,>50K\n".as_bytes(), &opts, "mem").unwrap();
        assert_eq!(rows[0]["age"], json!("NAN"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = parse_csv_records("a,b\n1\n".as_bytes(), &CsvOptions::default(), "mem");
        assert!(err.is_err());
    }
}
