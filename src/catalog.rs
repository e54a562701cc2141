//! Versioned dataset catalog.
//!
//! A [`Catalog`] maps `(identifier, version)` to a [`Source`]: the driver to
//! construct, its arguments and opaque metadata. Catalog files are YAML
//! (`.yaml`/`.yml`) or JSON (`.json`); entries are always written in key order
//! so the same catalog serializes to the same bytes.
//!
//! ```yaml
//! sources:
//! - identifier: camvid
//!   version: 2
//!   driver_name: jsonl_shards
//!   driver_kwargs:
//!     url: /data/camvid_shards
//!   metadata: {}
//! ```

use crate::driver::{Driver, IterKwargs};
use crate::registry::DriverRegistry;
use crate::store::Stores;
use crate::stream::RecordStream;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogKey {
    pub identifier: String,
    pub version: u64,
}

impl CatalogKey {
    pub fn new(identifier: impl Into<String>, version: u64) -> Self {
        Self {
            identifier: identifier.into(),
            version,
        }
    }
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.version)
    }
}

/// How to open one dataset version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub driver_name: String,
    #[serde(default)]
    pub driver_kwargs: Map<String, Value>,
    /// Carried through untouched.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Source {
    pub fn new(driver_name: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kwarg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.driver_kwargs.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Construct the driver through `registry`.
    ///
    /// # Errors
    /// Unknown driver names and invalid `driver_kwargs`.
    pub fn load(&self, registry: &DriverRegistry) -> Result<Box<dyn Driver>> {
        registry
            .create(&self.driver_name, &self.driver_kwargs)
            .with_context(|| format!("load driver `{}`", self.driver_name))
    }

    /// Shorthand for `load(registry)?.get_iter(kwargs)`.
    ///
    /// # Errors
    /// See [`Source::load`] and [`Driver::get_iter`].
    pub fn get_iter(&self, registry: &DriverRegistry, kwargs: &IterKwargs) -> Result<RecordStream> {
        self.load(registry)?.get_iter(kwargs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogFormat {
    Yaml,
    Json,
}

impl CatalogFormat {
    /// Format for a catalog path, by extension.
    ///
    /// # Errors
    /// Extensions other than `yaml`, `yml` and `json`.
    pub fn from_path(path: &str) -> Result<Self> {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => bail!("catalog file {path} must end in .yaml, .yml or .json"),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sources: Vec<CatalogEntry>,
}

#[derive(Serialize, Deserialize)]
struct CatalogEntry {
    identifier: String,
    version: u64,
    driver_name: String,
    #[serde(default)]
    driver_kwargs: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    entries: BTreeMap<CatalogKey, Source>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every source contributed by the registry's plugins.
    #[must_use]
    pub fn from_plugins(registry: &DriverRegistry) -> Self {
        registry.sources().iter().cloned().collect()
    }

    /// Insert or replace; returns the previous source for `key`.
    pub fn insert(&mut self, key: CatalogKey, source: Source) -> Option<Source> {
        self.entries.insert(key, source)
    }

    #[must_use]
    pub fn get(&self, identifier: &str, version: u64) -> Option<&Source> {
        self.entries.get(&CatalogKey::new(identifier, version))
    }

    /// Known versions of `identifier`, ascending.
    #[must_use]
    pub fn versions(&self, identifier: &str) -> Vec<u64> {
        self.entries
            .keys()
            .filter(|k| k.identifier == identifier)
            .map(|k| k.version)
            .collect()
    }

    #[must_use]
    pub fn latest_version(&self, identifier: &str) -> Option<u64> {
        self.versions(identifier).last().copied()
    }

    /// Add all entries of `other`; its sources win on conflicts.
    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CatalogKey, &Source)> {
        self.entries.iter()
    }

    /// # Errors
    /// Serialization failures.
    pub fn to_bytes(&self, format: CatalogFormat) -> Result<Vec<u8>> {
        let file = CatalogFile {
            sources: self
                .entries
                .iter()
                .map(|(k, s)| CatalogEntry {
                    identifier: k.identifier.clone(),
                    version: k.version,
                    driver_name: s.driver_name.clone(),
                    driver_kwargs: s.driver_kwargs.clone(),
                    metadata: s.metadata.clone(),
                })
                .collect(),
        };
        Ok(match format {
            CatalogFormat::Yaml => serde_yaml::to_string(&file)
                .context("serialize catalog as YAML")?
                .into_bytes(),
            CatalogFormat::Json => {
                serde_json::to_vec_pretty(&file).context("serialize catalog as JSON")?
            }
        })
    }

    /// # Errors
    /// Malformed input.
    pub fn from_bytes(bytes: &[u8], format: CatalogFormat) -> Result<Self> {
        let file: CatalogFile = match format {
            CatalogFormat::Yaml => serde_yaml::from_slice(bytes).context("parse YAML catalog")?,
            CatalogFormat::Json => serde_json::from_slice(bytes).context("parse JSON catalog")?,
        };
        Ok(file
            .sources
            .into_iter()
            .map(|e| {
                (
                    CatalogKey::new(e.identifier, e.version),
                    Source {
                        driver_name: e.driver_name,
                        driver_kwargs: e.driver_kwargs,
                        metadata: e.metadata,
                    },
                )
            })
            .collect())
    }

    /// Write to a local path; parent directories are created.
    ///
    /// # Errors
    /// Unknown extensions and I/O failures.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to(&Stores::new(), &path.as_ref().to_string_lossy())
    }

    /// # Errors
    /// Unknown extensions, I/O failures and malformed files.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_from(&Stores::new(), &path.as_ref().to_string_lossy())
    }

    /// Write to any URL `stores` can resolve.
    ///
    /// # Errors
    /// Unknown extensions or schemes and write failures.
    pub fn write_to(&self, stores: &Stores, url: &str) -> Result<()> {
        let bytes = self.to_bytes(CatalogFormat::from_path(url)?)?;
        stores
            .put_file(url, &bytes)
            .with_context(|| format!("write catalog {url}"))
    }

    /// # Errors
    /// Unknown extensions or schemes, read failures and malformed files.
    pub fn read_from(stores: &Stores, url: &str) -> Result<Self> {
        let format = CatalogFormat::from_path(url)?;
        let bytes = stores.get_file(url)?;
        Self::from_bytes(&bytes, format).with_context(|| format!("read catalog {url}"))
    }
}

impl FromIterator<(CatalogKey, Source)> for Catalog {
    fn from_iter<I: IntoIterator<Item = (CatalogKey, Source)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Catalog {
        let mut cat = Catalog::new();
        cat.insert(
            CatalogKey::new("camvid", 2),
            Source::new("jsonl_shards")
                .with_kwarg("url", "/data/camvid_shards")
                .with_metadata("zeta", json!(1))
                .with_metadata("alpha", json!({"nested": [1.5, "x"]})),
        );
        cat.insert(CatalogKey::new("camvid", 1), Source::new("camvid"));
        cat.insert(CatalogKey::new("adult_income", 1), Source::new("adult_income"));
        cat
    }

    #[test]
    fn versions_are_sorted() {
        let cat = sample();
        assert_eq!(cat.versions("camvid"), vec![1, 2]);
        assert_eq!(cat.latest_version("camvid"), Some(2));
        assert_eq!(cat.latest_version("missing"), None);
    }

    #[test]
    fn yaml_and_json_round_trip_keep_metadata_order() {
        let cat = sample();
        for format in [CatalogFormat::Yaml, CatalogFormat::Json] {
            let bytes = cat.to_bytes(format).unwrap();
            let back = Catalog::from_bytes(&bytes, format).unwrap();
            assert_eq!(back, cat);
            let meta_keys: Vec<_> =
                back.get("camvid", 2).unwrap().metadata.keys().cloned().collect();
            assert_eq!(meta_keys, vec!["zeta", "alpha"]);
            assert_eq!(back.to_bytes(format).unwrap(), bytes);
        }
    }

    #[test]
    fn merge_prefers_incoming_sources() {
        let mut cat = sample();
        let mut other = Catalog::new();
        other.insert(CatalogKey::new("camvid", 1), Source::new("replaced"));
        cat.merge(other);
        assert_eq!(cat.get("camvid", 1).unwrap().driver_name, "replaced");
        assert_eq!(cat.len(), 3);
    }

    #[test]
    fn rejects_unknown_extension() {
        assert!(CatalogFormat::from_path("catalog.toml").is_err());
        assert_eq!(CatalogFormat::from_path("a/b.yml").unwrap(), CatalogFormat::Yaml);
    }
}
