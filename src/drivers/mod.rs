//! Built-in dataset drivers.
//!
//! All drivers read local files; nothing here talks to the network. Catalog
//! sources for the public datasets point at conventional local locations under
//! `data/` and can be overridden per catalog entry.

pub mod bdd100k;
pub mod camvid;
pub mod captions;
pub mod casting;
pub mod cc100;
pub mod ds_bowl;
pub mod imagenet;
pub mod shards;
pub mod split;
#[cfg(feature = "io-csv")]
pub mod tabular;
pub mod tweets;

use crate::catalog::{CatalogKey, Source};
use crate::driver::{Driver, DriverCtor, IterKwargs};
use crate::record::{Record, set_bytes, str_field};
use crate::registry::Plugin;
use crate::store::Stores;
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Seed used by drivers when the caller does not pass `seed`.
pub const DEFAULT_SEED: u64 = 42;

const CALIFORNIA_HOUSING_SRC: &str =
    "https://github.com/scikit-learn/scikit-learn/blob/36958fb24/sklearn/datasets/_california_housing.py";

fn glob_sorted(dir: &Path, suffix: &str, keep: fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("directory {} does not exist", dir.display());
    }
    let pattern = format!("{}/{suffix}", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
        let path = entry.with_context(|| format!("list {}", dir.display()))?;
        if keep(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Regular files directly inside `dir`, sorted by path.
///
/// # Errors
/// Fails when `dir` does not exist or cannot be listed.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    glob_sorted(dir, "*", Path::is_file)
}

/// Regular files anywhere below `dir`, sorted by path.
///
/// # Errors
/// Fails when `dir` does not exist or cannot be listed.
pub fn list_files_nested(dir: &Path) -> Result<Vec<PathBuf>> {
    glob_sorted(dir, "**/*", Path::is_file)
}

/// Directories directly inside `dir`, sorted by path.
///
/// # Errors
/// Fails when `dir` does not exist or cannot be listed.
pub fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    glob_sorted(dir, "*", Path::is_dir)
}

/// Read the file named by `url_field` and store its bytes under `into`.
///
/// # Errors
/// Missing field or unreadable file.
pub fn load_file_field(mut record: Record, url_field: &str, into: &str) -> Result<Record> {
    let path = str_field(&record, url_field)?.to_string();
    let bytes = std::fs::read(&path).with_context(|| format!("read {path}"))?;
    set_bytes(&mut record, into, bytes);
    Ok(record)
}

macro_rules! driver_ctor {
    ($ty:ty) => {{
        fn make(kwargs: &IterKwargs, _: &Stores) -> Result<Box<dyn Driver>> {
            Ok(Box::new(<$ty>::from_kwargs(kwargs)?))
        }
        make as DriverCtor
    }};
    ($ty:ty, stores) => {{
        fn make(kwargs: &IterKwargs, stores: &Stores) -> Result<Box<dyn Driver>> {
            Ok(Box::new(<$ty>::from_kwargs(kwargs, stores)?))
        }
        make as DriverCtor
    }};
}

/// The plugin registered by [`crate::registry::DriverRegistry::with_builtin`].
pub struct Builtin;

impl Plugin for Builtin {
    fn name(&self) -> &str {
        "builtin"
    }

    fn drivers(&self) -> Vec<(&'static str, DriverCtor)> {
        vec![
            (shards::NAME, driver_ctor!(shards::JsonlShards, stores)),
            #[cfg(feature = "io-csv")]
            (tabular::ADULT_INCOME, driver_ctor!(tabular::AdultIncome)),
            #[cfg(feature = "io-csv")]
            (tabular::CALIFORNIA_HOUSING, driver_ctor!(tabular::CaliforniaHousing)),
            #[cfg(feature = "io-csv")]
            (tabular::CSV, driver_ctor!(tabular::CsvDriver)),
            (camvid::NAME, driver_ctor!(camvid::Camvid)),
            (casting::NAME, driver_ctor!(casting::RawKaggleCastingQuality)),
            (cc100::NAME, driver_ctor!(cc100::Cc100)),
            (captions::NAME, driver_ctor!(captions::ConceptualCaptions12m)),
            (tweets::NAME, driver_ctor!(tweets::MonthlyGermanTweets)),
            (imagenet::NAME, driver_ctor!(imagenet::RawImageNet)),
            (ds_bowl::NAME, driver_ctor!(ds_bowl::DataScienceBowl2018)),
            (bdd100k::NAME, driver_ctor!(bdd100k::Bdd100k)),
        ]
    }

    fn sources(&self) -> Vec<(CatalogKey, Source)> {
        let subsets: Map<String, Value> = cc100::LANGUAGES
            .iter()
            .map(|lang| ((*lang).to_string(), Value::from(format!("data/cc100/{lang}.txt.xz"))))
            .collect();
        vec![
            (
                CatalogKey::new("adult_income", 1),
                Source::new("adult_income")
                    .with_kwarg("url", "data/adult_income/adult.csv")
                    .with_metadata(
                        "src",
                        "http://www.cs.toronto.edu/~delve/data/adult/adultDetail.html",
                    ),
            ),
            (
                CatalogKey::new("california_housing", 1),
                Source::new("california_housing")
                    .with_kwarg("url", "data/california_housing/cal_housing.csv.gz")
                    .with_metadata("src", CALIFORNIA_HOUSING_SRC),
            ),
            (
                CatalogKey::new("cc100", 1),
                Source::new("cc100").with_kwarg("subsets", Value::Object(subsets)),
            ),
            (
                CatalogKey::new("conceptual-captions-12m", 1),
                Source::new("conceptual-captions-12m")
                    .with_kwarg("index_url", "data/conceptual_captions/cc12m.tsv"),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DriverRegistry;

    #[test]
    fn builtin_registers_every_driver() {
        let reg = DriverRegistry::with_builtin();
        for name in [
            "jsonl_shards",
            "camvid",
            "raw_kaggle_casting_quality",
            "cc100",
            "conceptual-captions-12m",
            "raw_monthly_german_tweets",
            "raw_imagenet",
            "ds_bowl_18",
            "bdd100k",
        ] {
            assert!(reg.contains(name), "{name}");
        }
        #[cfg(feature = "io-csv")]
        for name in ["adult_income", "california_housing", "csv"] {
            assert!(reg.contains(name), "{name}");
        }
    }

    #[cfg(feature = "io-csv")]
    #[test]
    fn builtin_sources_name_registered_drivers() {
        let reg = DriverRegistry::with_builtin();
        assert_eq!(reg.sources().len(), 4);
        for (key, source) in reg.sources() {
            assert_eq!(key.version, 1);
            assert!(reg.contains(&source.driver_name), "{key}");
        }
    }

    #[test]
    fn list_files_skips_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.png"), b"b").unwrap();
        std::fs::write(tmp.path().join("a.png"), b"a").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        let files = list_files(tmp.path()).unwrap();
        let name = |p: &PathBuf| p.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(files.iter().map(name).collect::<Vec<_>>(), vec!["a.png", "b.png"]);
        assert!(list_files(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn nested_listing_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("n02/deep")).unwrap();
        std::fs::create_dir(tmp.path().join("n01")).unwrap();
        std::fs::write(tmp.path().join("n02/deep/x.JPEG"), b"x").unwrap();
        std::fs::write(tmp.path().join("n01/y.JPEG"), b"y").unwrap();
        std::fs::write(tmp.path().join("top.txt"), b"t").unwrap();
        let nested = list_files_nested(tmp.path()).unwrap();
        assert_eq!(nested.len(), 3);
        assert!(nested.iter().all(|p| p.is_file()));
        let dirs = list_dirs(tmp.path()).unwrap();
        assert_eq!(dirs, vec![tmp.path().join("n01"), tmp.path().join("n02")]);
    }
}
