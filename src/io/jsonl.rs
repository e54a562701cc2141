//! JSON Lines encoding for shard payloads.
//!
//! One compact JSON value per line, `\n`-terminated. Blank lines are skipped on
//! read. Compression is handled by the caller (see [`crate::io::compression`]).

use crate::io::compression::DynRead;
use crate::record::Record;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufRead, BufReader, Write};

/// Serialize `items` into an uncompressed JSONL buffer.
///
/// # Errors
/// Fails when an item cannot be serialized.
pub fn encode_jsonl<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(items.len() * 64);
    for (i, item) in items.iter().enumerate() {
        serde_json::to_writer(&mut buf, item).with_context(|| format!("serialize item #{i}"))?;
        buf.write_all(b"\n")?;
    }
    Ok(buf)
}

/// Lazily yields one [`Record`] per non-blank line of a decoded reader.
pub struct JsonlRecords {
    lines: std::io::Lines<BufReader<DynRead>>,
    label: String,
    line_no: usize,
}

impl JsonlRecords {
    /// `label` names the input in errors.
    #[must_use]
    pub fn new(reader: DynRead, label: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            label: label.into(),
            line_no: 0,
        }
    }
}

impl Iterator for JsonlRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_no += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    let at = format!("read line {} in {}", self.line_no, self.label);
                    return Some(Err(e).context(at));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str::<Record>(&line).with_context(|| {
                format!("parse JSONL line {} in {}", self.line_no, self.label)
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn encode_then_stream_skips_blank_lines() {
        let mut buf = encode_jsonl(&[json!({"id": 1}), json!({"id": 2})]).unwrap();
        buf.extend_from_slice(b"\n   \n");
        let rows: Vec<Record> = JsonlRecords::new(Box::new(Cursor::new(buf)), "mem")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], json!(2));
    }

    #[test]
    fn parse_error_names_line() {
        let bytes = b"{\"a\":1}\nnot json\n".to_vec();
        let mut rows = JsonlRecords::new(Box::new(Cursor::new(bytes)), "buf");
        assert!(rows.next().unwrap().is_ok());
        let err = rows.next().unwrap().unwrap_err();
        assert!(format!("{err:#}").contains("line 2 in buf"));
        assert!(rows.next().is_none());
    }
}
