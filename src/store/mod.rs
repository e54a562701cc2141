//! Key-value shard stores.
//!
//! A shard store maps a key (`shard_0`, `shard_1`, ...) to a sequence of
//! records. Each value is one JSON Lines payload, compressed according to the
//! store's extension (`jsonl.gz` unless configured otherwise).
//!
//! [`Stores`] turns a destination URL into a store: plain paths and `file://`
//! URLs become an [`FsShardStore`]; URLs whose scheme has a registered
//! [`ObjectIO`] backend become an [`ObjectShardStore`].

mod fs;
mod lazy;
mod object;

pub use fs::FsShardStore;
pub use lazy::LazyStore;
pub use object::ObjectShardStore;

use crate::io::cloud::{ObjectIO, parse_object_url, url_scheme};
use crate::io::compression::DynRead;
use crate::io::jsonl::JsonlRecords;
use crate::record::Record;
use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default value encoding: gzip-compressed JSON Lines.
pub const DEFAULT_EXTENSION: &str = "jsonl.gz";

/// Key under which partition `index` is stored.
#[must_use]
pub fn shard_key(index: usize) -> String {
    format!("shard_{index}")
}

/// A destination that stores record sequences under string keys.
///
/// Implementations are shared by parallel writers; every writer owns distinct
/// keys, so `set` needs no coordination beyond being `Sync`. A failed `set` is
/// reported as is; stores never retry.
pub trait ShardStore: Send + Sync {
    /// URL the store was opened from.
    fn url(&self) -> &str;

    /// Create or overwrite `key`.
    ///
    /// # Errors
    /// Fails when the payload cannot be encoded or persisted.
    fn set(&self, key: &str, records: &[Record]) -> Result<()>;

    /// Decompressed payload of `key`.
    ///
    /// # Errors
    /// Fails when `key` does not exist or its codec cannot be set up.
    fn reader(&self, key: &str) -> Result<DynRead>;

    /// Lazily decoded records of `key`.
    ///
    /// # Errors
    /// Fails when `key` cannot be opened; malformed lines arrive as `Err` items.
    fn records(&self, key: &str) -> Result<JsonlRecords> {
        Ok(JsonlRecords::new(self.reader(key)?, format!("{}/{key}", self.url())))
    }

    /// # Errors
    /// Fails when `key` does not exist or cannot be decoded.
    fn get(&self, key: &str) -> Result<Vec<Record>> {
        self.records(key)?.collect()
    }

    /// Stored keys, sorted.
    ///
    /// # Errors
    /// Fails when the destination cannot be listed.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Opens shard stores and catalog files by URL.
#[derive(Clone)]
pub struct Stores {
    backends: BTreeMap<String, Arc<dyn ObjectIO>>,
    extension: String,
}

impl Default for Stores {
    fn default() -> Self {
        Self {
            backends: BTreeMap::new(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores")
            .field("schemes", &self.backends.keys().collect::<Vec<_>>())
            .field("extension", &self.extension)
            .finish()
    }
}

enum Location {
    Local(PathBuf),
    Object(Arc<dyn ObjectIO>),
}

impl Stores {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `scheme://bucket/prefix` URLs from `backend`.
    #[must_use]
    pub fn register_scheme(
        mut self,
        scheme: impl Into<String>,
        backend: Arc<dyn ObjectIO>,
    ) -> Self {
        self.backends.insert(scheme.into(), backend);
        self
    }

    /// Value encoding for new stores, e.g. `jsonl`, `jsonl.gz`, `jsonl.zst`.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn locate(&self, url: &str) -> Result<Location> {
        match url_scheme(url) {
            None => Ok(Location::Local(PathBuf::from(url))),
            Some("file") => Ok(Location::Local(PathBuf::from(&url["file://".len()..]))),
            Some(scheme) => self
                .backends
                .get(scheme)
                .cloned()
                .map(Location::Object)
                .ok_or_else(|| {
                    anyhow!("no storage backend registered for scheme `{scheme}` ({url})")
                }),
        }
    }

    /// Open the shard store at `url`. Local directories are created here, so
    /// call this only once there is something to write.
    ///
    /// # Errors
    /// Fails for unknown schemes and when the destination cannot be prepared.
    pub fn open(&self, url: &str) -> Result<Arc<dyn ShardStore>> {
        Ok(match self.locate(url)? {
            Location::Local(dir) => Arc::new(FsShardStore::create(dir, url, &self.extension)?),
            Location::Object(io) => Arc::new(ObjectShardStore::new(io, url, &self.extension)?),
        })
    }

    /// Open an existing store for reading, without creating anything.
    ///
    /// # Errors
    /// Fails for unknown schemes and missing local directories.
    pub fn open_existing(&self, url: &str) -> Result<Arc<dyn ShardStore>> {
        Ok(match self.locate(url)? {
            Location::Local(dir) => Arc::new(FsShardStore::existing(dir, url, &self.extension)?),
            Location::Object(io) => Arc::new(ObjectShardStore::new(io, url, &self.extension)?),
        })
    }

    /// Write a whole file (catalogs); local parents are created.
    ///
    /// # Errors
    /// Fails when the file cannot be written.
    pub fn put_file(&self, url: &str, bytes: &[u8]) -> Result<()> {
        match self.locate(url)? {
            Location::Local(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("mkdir -p {}", parent.display()))?;
                }
                std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))
            }
            Location::Object(io) => {
                let (bucket, key) = object_file(url)?;
                io.put_object(&bucket, &key, bytes)
                    .with_context(|| format!("upload {url}"))
            }
        }
    }

    /// # Errors
    /// Fails when the file does not exist or cannot be read.
    pub fn get_file(&self, url: &str) -> Result<Vec<u8>> {
        match self.locate(url)? {
            Location::Local(path) => {
                std::fs::read(&path).with_context(|| format!("read {}", path.display()))
            }
            Location::Object(io) => {
                let (bucket, key) = object_file(url)?;
                io.get_object(&bucket, &key).with_context(|| format!("download {url}"))
            }
        }
    }
}

fn object_file(url: &str) -> Result<(String, String)> {
    let parsed = parse_object_url(url)?;
    if parsed.prefix.is_empty() {
        bail!("{url} names a bucket, not an object");
    }
    Ok((parsed.bucket, parsed.prefix))
}
