//! Export a dataset into shards and register the result in a catalog.
//!
//! A run reads records from a source, applies the hook chain as one per-record
//! stage, regroups the records into `num_shards` partitions and writes every
//! non-empty partition under `shard_{index}`. Once every write has returned,
//! a catalog holding the single entry `(identifier, version + 1)` is written,
//! pointing the `jsonl_shards` driver at the output.
//!
//! Partition writes are fail-fast: the first failing write stops new writes
//! from starting, writes already in flight finish, and the run fails without
//! touching the catalog. Shards already written stay in place.

use crate::catalog::{Catalog, CatalogKey, Source};
use crate::collection::from_vec;
use crate::driver::IterKwargs;
use crate::drivers::shards;
use crate::error::{ShardError, Stage, StageError};
use crate::hooks::{Hook, HookChain};
use crate::pipeline::Pipeline;
use crate::record::Record;
use crate::registry::DriverRegistry;
use crate::runner::Runner;
use crate::store::{LazyStore, Stores, shard_key};
use crate::stream::RecordStream;
use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info};

/// Parameters of one shard run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub identifier: String,
    /// Input version; the output is registered as `version + 1`.
    pub version: u64,
    pub num_shards: usize,
    pub output_data_url: String,
    pub output_catalog_url: String,
    /// Shard only the first `n` records of the source.
    #[serde(default)]
    pub num_samples: Option<usize>,
}

impl ShardConfig {
    /// # Errors
    /// Empty names or URLs and zero counts.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            bail!("identifier must not be empty");
        }
        if self.version == 0 {
            bail!("version must be at least 1");
        }
        if self.num_shards == 0 {
            bail!("num_shards must be at least 1");
        }
        if self.num_samples == Some(0) {
            bail!("num_samples must be at least 1 when set");
        }
        if self.output_data_url.is_empty() {
            bail!("output_data_url must not be empty");
        }
        if self.output_catalog_url.is_empty() {
            bail!("output_catalog_url must not be empty");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Configured,
    Reading,
    Transforming,
    Partitioning,
    Writing,
    Cataloging,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configured => "CONFIGURED",
            Self::Reading => "READING",
            Self::Transforming => "TRANSFORMING",
            Self::Partitioning => "PARTITIONING",
            Self::Writing => "WRITING",
            Self::Cataloging => "CATALOGING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardReport {
    /// Records written across all shards.
    pub records: usize,
    /// Keys written, sorted by partition index.
    pub shard_keys: Vec<String>,
    /// Entry written to the output catalog; `None` for stream-only runs.
    pub catalog_key: Option<CatalogKey>,
}

struct RunLog<'a> {
    cfg: &'a ShardConfig,
    state: RunState,
}

impl<'a> RunLog<'a> {
    fn start(cfg: &'a ShardConfig) -> Self {
        let log = Self {
            cfg,
            state: RunState::Configured,
        };
        log.emit();
        log
    }

    fn emit(&self) {
        info!(
            identifier = %self.cfg.identifier,
            version = self.cfg.version,
            state = %self.state,
            "shard run"
        );
    }

    fn enter(&mut self, state: RunState) {
        self.state = state;
        self.emit();
    }

    fn finish<T>(mut self, result: Result<T, ShardError>) -> Result<T, ShardError> {
        match result {
            Ok(v) => {
                self.enter(RunState::Done);
                Ok(v)
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(
                    identifier = %self.cfg.identifier,
                    version = self.cfg.version,
                    state = %RunState::Failed,
                    failed_in = %self.state,
                    kind = e.kind(),
                    error = %message,
                    "shard run failed"
                );
                Err(e)
            }
        }
    }
}

/// Runs shard exports.
#[derive(Clone, Debug, Default)]
pub struct SaveShards {
    stores: Stores,
    runner: Runner,
    hooks: HookChain,
}

impl SaveShards {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    #[must_use]
    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Append one hook to the chain.
    #[must_use]
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub const fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Shard `stream` without writing a catalog.
    ///
    /// # Errors
    /// `Config` for an invalid `cfg`, `SourceRead` when the stream yields an
    /// error, `Transform` for hook failures, `Write` for store failures and
    /// `Engine` for anything else.
    pub fn save_stream(
        &self,
        cfg: &ShardConfig,
        stream: RecordStream,
    ) -> Result<ShardReport, ShardError> {
        let mut log = RunLog::start(cfg);
        let result = cfg
            .validate()
            .map_err(ShardError::Config)
            .and_then(|()| self.shard(cfg, stream, &mut log));
        log.finish(result)
    }

    /// Shard catalog entry `(cfg.identifier, cfg.version)` and write the
    /// updated catalog to `cfg.output_catalog_url`.
    ///
    /// # Errors
    /// As [`SaveShards::save_stream`]; a missing entry or failing driver is
    /// `SourceRead` and a failed catalog write is `CatalogWrite`.
    pub fn save_source(
        &self,
        cfg: &ShardConfig,
        catalog: &Catalog,
        registry: &DriverRegistry,
        iter_kwargs: &IterKwargs,
    ) -> Result<ShardReport, ShardError> {
        let mut log = RunLog::start(cfg);
        let result = cfg.validate().map_err(ShardError::Config).and_then(|()| {
            log.enter(RunState::Reading);
            let source = catalog
                .get(&cfg.identifier, cfg.version)
                .ok_or_else(|| {
                    ShardError::SourceRead(anyhow!(
                        "catalog has no entry {}",
                        CatalogKey::new(cfg.identifier.clone(), cfg.version)
                    ))
                })?;
            let stream = source
                .get_iter(registry, iter_kwargs)
                .map_err(ShardError::SourceRead)?;
            let mut report = self.shard(cfg, stream, &mut log)?;

            log.enter(RunState::Cataloging);
            let key = update_catalog(cfg, &source.metadata, &self.stores)
                .map_err(ShardError::CatalogWrite)?;
            report.catalog_key = Some(key);
            Ok(report)
        });
        log.finish(result)
    }

    fn shard(
        &self,
        cfg: &ShardConfig,
        stream: RecordStream,
        log: &mut RunLog<'_>,
    ) -> Result<ShardReport, ShardError> {
        if log.state != RunState::Reading {
            log.enter(RunState::Reading);
        }
        let stream = match cfg.num_samples {
            Some(n) => stream.take(n),
            None => stream,
        };
        let records = stream.collect().map_err(ShardError::SourceRead)?;
        debug!(records = records.len(), "source drained");

        log.enter(RunState::Transforming);
        let p = Pipeline::default();
        let hooks = self.hooks.clone();
        let transformed = from_vec(&p, records).try_filter_map(move |r: Record| {
            hooks
                .apply(r)
                .map_err(|e| StageError::tag(Stage::Transform, e))
        });

        log.enter(RunState::Partitioning);
        let shards = transformed.repartition(cfg.num_shards);

        log.enter(RunState::Writing);
        let store = LazyStore::new(&self.stores, cfg.output_data_url.clone());
        let written: Mutex<Vec<(usize, String, usize)>> = Mutex::new(Vec::new());
        shards
            .for_each_partition(&self.runner, |index, part: Vec<Record>| {
                let len = part.len();
                let key = write_partition(&store, index, part)
                    .map_err(|e| StageError::tag(Stage::Write, e))?;
                if let Some(key) = key {
                    written
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, key, len));
                }
                Ok(())
            })
            .map_err(StageError::classify)?;

        let mut written = written.into_inner().unwrap_or_else(PoisonError::into_inner);
        written.sort_unstable_by_key(|(index, ..)| *index);
        Ok(ShardReport {
            records: written.iter().map(|(.., len)| len).sum(),
            shard_keys: written.into_iter().map(|(_, key, _)| key).collect(),
            catalog_key: None,
        })
    }
}

/// Persist one partition as `shard_{index}`. Empty partitions are skipped and
/// never open the store.
///
/// # Errors
/// Fails when the store cannot be opened or the write fails.
pub fn write_partition(
    store: &LazyStore<'_>,
    index: usize,
    records: Vec<Record>,
) -> Result<Option<String>> {
    if records.is_empty() {
        debug!(index, "skipping empty partition");
        return Ok(None);
    }
    let key = shard_key(index);
    store.get()?.set(&key, &records)?;
    debug!(key = %key, records = records.len(), "wrote shard");
    Ok(Some(key))
}

/// Write a catalog with the single entry `(identifier, version + 1)` served by
/// the `jsonl_shards` driver from `output_data_url`, carrying `metadata`
/// unchanged. Running twice overwrites the same entry.
///
/// # Errors
/// Fails on version overflow and when the catalog cannot be written.
pub fn update_catalog(
    cfg: &ShardConfig,
    metadata: &Map<String, Value>,
    stores: &Stores,
) -> Result<CatalogKey> {
    let version = cfg
        .version
        .checked_add(1)
        .ok_or_else(|| anyhow!("version {} cannot be incremented", cfg.version))?;
    let key = CatalogKey::new(cfg.identifier.clone(), version);
    let mut source = Source::new(shards::NAME).with_kwarg("url", cfg.output_data_url.clone());
    if stores.extension() != crate::store::DEFAULT_EXTENSION {
        source = source.with_kwarg("extension", stores.extension());
    }
    source.metadata = metadata.clone();

    let mut catalog = Catalog::new();
    catalog.insert(key.clone(), source);
    catalog.write_to(stores, &cfg.output_catalog_url)?;
    info!(entry = %key, url = %cfg.output_catalog_url, "catalog written");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ShardConfig {
        ShardConfig {
            identifier: "camvid".into(),
            version: 1,
            num_shards: 5,
            output_data_url: "out".into(),
            output_catalog_url: "out/catalog.yaml".into(),
            num_samples: None,
        }
    }

    #[test]
    fn validate_rejects_zero_counts() {
        assert!(cfg().validate().is_ok());
        for bad in [
            ShardConfig { num_shards: 0, ..cfg() },
            ShardConfig { version: 0, ..cfg() },
            ShardConfig { num_samples: Some(0), ..cfg() },
            ShardConfig { identifier: String::new(), ..cfg() },
            ShardConfig { output_catalog_url: String::new(), ..cfg() },
        ] {
            assert!(bad.validate().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn num_samples_defaults_to_none() {
        let parsed: ShardConfig = serde_json::from_str(
            r#"{"identifier":"a","version":1,"num_shards":2,"output_data_url":"o","output_catalog_url":"o.yaml"}"#,
        )
        .unwrap();
        assert_eq!(parsed.num_samples, None);
    }

    #[test]
    fn empty_partition_never_opens_store() {
        let tmp = tempfile::tempdir().unwrap();
        let stores = Stores::new();
        let url = tmp.path().join("never").to_string_lossy().into_owned();
        let lazy = LazyStore::new(&stores, url.clone());
        assert_eq!(write_partition(&lazy, 3, Vec::new()).unwrap(), None);
        assert!(!lazy.is_open());
        assert!(!std::path::Path::new(&url).exists());
    }

    #[test]
    fn run_states_print_upper_case() {
        assert_eq!(RunState::Cataloging.to_string(), "CATALOGING");
        assert_eq!(RunState::Failed.to_string(), "FAILED");
    }
}
