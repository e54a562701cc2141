//! CSV-backed tabular datasets.

use super::DEFAULT_SEED;
use super::split::proportionate_split;
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::io::csv::{CsvOptions, read_csv_records};
use crate::record::Record;
use crate::stream::RecordStream;
use anyhow::{Result, bail};
use serde_json::Value;

pub const ADULT_INCOME: &str = "adult_income";
pub const CALIFORNIA_HOUSING: &str = "california_housing";
pub const CSV: &str = "csv";

const CALIFORNIA_COLUMNS: [&str; 9] = [
    "longitude",
    "latitude",
    "housingMedianAge",
    "totalRooms",
    "totalBedrooms",
    "population",
    "households",
    "medianIncome",
    "medianHouseValue",
];

const SPLITS: [&str; 2] = ["train", "test"];

/// Shuffle the rows with the `shuffle_item_buffer` and `seed` arguments.
fn shuffled(rows: Vec<Record>, k: &Kwargs<'_>) -> Result<RecordStream> {
    let size = k.usize_or("shuffle_item_buffer", 100)?;
    let seed = k.u64_or("seed", DEFAULT_SEED)?;
    Ok(RecordStream::from_records(rows).shuffle(size, size, seed))
}

fn select_split(rows: Vec<Record>, label: &str, fraction: f64, split: &str) -> Vec<Record> {
    let (train, test) = proportionate_split(rows, label, fraction, DEFAULT_SEED);
    if split == "test" { test } else { train }
}

/// UCI adult census income. 20% of every `class` goes to `test` (seed 42);
/// empty cells read as `"NAN"`.
///
/// Constructor: `url` (default `data/adult_income/adult.csv`).
/// `get_iter`: `split` (`train`/`test`, default `train`),
/// `shuffle_item_buffer` (default 100), `seed`.
pub struct AdultIncome {
    url: String,
}

impl AdultIncome {
    /// # Errors
    /// Non-string `url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        let k = Kwargs::new(kwargs, ADULT_INCOME);
        Ok(Self {
            url: k.str_or("url", "data/adult_income/adult.csv")?.to_string(),
        })
    }
}

impl Driver for AdultIncome {
    fn name(&self) -> &'static str {
        ADULT_INCOME
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        let k = Kwargs::new(kwargs, ADULT_INCOME);
        let split = k.split(&SPLITS, "train")?;
        let opts = CsvOptions {
            fill_empty: Some(Value::from("NAN")),
            ..CsvOptions::default()
        };
        let rows = read_csv_records(&self.url, &opts)?;
        shuffled(select_split(rows, "class", 0.2, split), &k)
    }
}

/// California housing prices; a headerless CSV with fixed column names.
///
/// Constructor: `url` (default `data/california_housing/cal_housing.csv.gz`).
/// `get_iter`: `shuffle_item_buffer` (default 100), `seed`.
pub struct CaliforniaHousing {
    url: String,
}

impl CaliforniaHousing {
    /// # Errors
    /// Non-string `url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        let k = Kwargs::new(kwargs, CALIFORNIA_HOUSING);
        Ok(Self {
            url: k
                .str_or("url", "data/california_housing/cal_housing.csv.gz")?
                .to_string(),
        })
    }
}

impl Driver for CaliforniaHousing {
    fn name(&self) -> &'static str {
        CALIFORNIA_HOUSING
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        let opts = CsvOptions {
            has_headers: false,
            column_names: Some(CALIFORNIA_COLUMNS.iter().map(|c| (*c).to_string()).collect()),
            ..CsvOptions::default()
        };
        let rows = read_csv_records(&self.url, &opts)?;
        shuffled(rows, &Kwargs::new(kwargs, CALIFORNIA_HOUSING))
    }
}

/// Any CSV file.
///
/// Constructor: `url` (required), `has_headers` (default true), `columns`,
/// `delimiter` (one character, default `,`), and optionally `label_column` plus
/// `test_fraction` (default 0.2) to enable `split`.
/// `get_iter`: `split`, `shuffle_item_buffer` (default 1, no shuffling), `seed`.
pub struct CsvDriver {
    url: String,
    opts: CsvOptions,
    label_column: Option<String>,
    test_fraction: f64,
}

impl CsvDriver {
    /// # Errors
    /// Missing `url` or invalid option values.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        let k = Kwargs::new(kwargs, CSV);
        let delimiter = match k.str_or("delimiter", ",")?.as_bytes() {
            [b] => *b,
            _ => bail!("{CSV}: argument `delimiter` must be a single byte"),
        };
        let test_fraction = match kwargs.get("test_fraction") {
            None | Some(Value::Null) => 0.2,
            Some(v) => match v.as_f64() {
                Some(f) if (0.0..=1.0).contains(&f) => f,
                _ => bail!("{CSV}: argument `test_fraction` must be a number in [0, 1]"),
            },
        };
        Ok(Self {
            url: k.required_str("url")?.to_string(),
            opts: CsvOptions {
                has_headers: k.bool_or("has_headers", true)?,
                column_names: k.str_list("columns")?,
                delimiter,
                fill_empty: None,
            },
            label_column: k.str_list("label_column")?.and_then(|v| v.into_iter().next()),
            test_fraction,
        })
    }
}

impl Driver for CsvDriver {
    fn name(&self) -> &'static str {
        CSV
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        let k = Kwargs::new(kwargs, CSV);
        let mut rows = read_csv_records(&self.url, &self.opts)?;
        if kwargs.get("split").is_some_and(|v| !v.is_null()) {
            let Some(label) = &self.label_column else {
                bail!("{CSV}: `split` needs a `label_column` in the driver arguments");
            };
            let split = k.split(&SPLITS, "train")?;
            rows = select_split(rows, label, self.test_fraction, split);
        }
        let size = k.usize_or("shuffle_item_buffer", 1)?;
        let seed = k.u64_or("seed", DEFAULT_SEED)?;
        Ok(RecordStream::from_records(rows).shuffle(size, size, seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kw(v: Value) -> IterKwargs {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn csv_driver_reads_rows_in_order_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.csv");
        std::fs::write(&path, "a;b\n1;x\n2;y\n").unwrap();
        let d = CsvDriver::from_kwargs(&kw(json!({"url": path, "delimiter": ";"}))).unwrap();
        let rows = d.get_iter(&IterKwargs::new()).unwrap().collect().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["b"], json!("y"));
    }

    #[test]
    fn csv_split_requires_label_column() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.csv");
        std::fs::write(&path, "a\n1\n").unwrap();
        let d = CsvDriver::from_kwargs(&kw(json!({"url": path}))).unwrap();
        assert!(d.get_iter(&kw(json!({"split": "train"}))).is_err());
    }

    #[test]
    fn bad_delimiter_is_rejected() {
        assert!(CsvDriver::from_kwargs(&kw(json!({"url": "x.csv", "delimiter": ";;"}))).is_err());
    }
}
