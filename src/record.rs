//! The record type every driver yields.
//!
//! A [`Record`] is a schema-less mapping from field names to JSON values. Field
//! order is preserved (insertion order), so a record serializes to the same bytes
//! every time it is written.

use anyhow::{Result, anyhow};
use serde_json::{Map, Value};

/// One dataset sample.
pub type Record = Map<String, Value>;

/// Build a record from `(field, value)` pairs.
///
/// ```
/// use dataset_drivers::record::record_from;
/// let r = record_from([("id", 1.into()), ("split", "train".into())]);
/// assert_eq!(r["split"], "train");
/// ```
pub fn record_from<K, I>(pairs: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Read a string field, failing with the field name when it is missing or not a string.
///
/// # Errors
/// Returns an error if `field` is absent or holds a non-string value.
pub fn str_field<'a>(record: &'a Record, field: &str) -> Result<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("record has no string field `{field}`"))
}

/// Store raw bytes in a record as an array of byte values.
pub fn set_bytes(record: &mut Record, field: &str, bytes: Vec<u8>) {
    let arr = bytes.into_iter().map(Value::from).collect();
    record.insert(field.to_string(), Value::Array(arr));
}

/// Group label used by the split helpers: the field rendered as a string,
/// `"null"` when the field is missing.
pub(crate) fn group_label(record: &Record, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_keeps_insertion_order() {
        let r = record_from([("z", 1.into()), ("a", 2.into())]);
        let keys: Vec<_> = r.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn str_field_reports_missing_field() {
        let r = record_from([("n", 3.into())]);
        let err = str_field(&r, "n").unwrap_err();
        assert!(err.to_string().contains("`n`"));
    }

    #[test]
    fn group_label_renders_non_strings() {
        let r = record_from([("class", 1.into()), ("name", "x".into())]);
        assert_eq!(group_label(&r, "class"), "1");
        assert_eq!(group_label(&r, "name"), "x");
        assert_eq!(group_label(&r, "missing"), "null");
    }
}
