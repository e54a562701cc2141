//! Shard job files.
//!
//! A job file is a [`ShardConfig`] plus the arguments passed to the driver and
//! the engine settings, in YAML or JSON:
//!
//! ```yaml
//! identifier: camvid
//! version: 1
//! num_shards: 5
//! output_data_url: /data/camvid_shards
//! output_catalog_url: /data/camvid_shards/shards.yaml
//! iter_kwargs:
//!   split: train
//! engine:
//!   threads: 4
//! ```

use crate::drivers::{camvid, casting};
use crate::error::ShardError;
use crate::hooks::HookChain;
use crate::preprocessing::{SaveShards, ShardConfig};
use crate::runner::Runner;
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run on the calling thread only.
    pub sequential: bool,
    /// Worker threads; the global pool when unset.
    pub threads: Option<usize>,
    /// Source partitions; twice the CPU count when unset.
    pub partitions: Option<usize>,
}

impl EngineConfig {
    #[must_use]
    pub fn runner(&self) -> Runner {
        if self.sequential {
            Runner::sequential()
        } else {
            Runner::parallel(self.threads, self.partitions)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardJobConfig {
    #[serde(flatten)]
    pub shard: ShardConfig,
    #[serde(default)]
    pub iter_kwargs: Map<String, Value>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ShardJobConfig {
    /// Load and validate a `.yaml`, `.yml` or `.json` job file.
    ///
    /// # Errors
    /// [`ShardError::Config`] for unreadable, malformed or invalid files.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShardError> {
        let path = path.as_ref();
        Self::load(path).map_err(ShardError::Config)
    }

    fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let job: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_slice(&bytes)
                .with_context(|| format!("parse {}", path.display()))?,
            Some("json") => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse {}", path.display()))?,
            _ => return Err(anyhow!("{} must end in .yaml, .yml or .json", path.display())),
        };
        job.shard
            .validate()
            .with_context(|| format!("invalid job {}", path.display()))?;
        Ok(job)
    }

    /// Built-in jobs for the bundled image datasets.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        let (shard, kwargs) = match name {
            "camvid" => (
                ShardConfig {
                    identifier: "camvid".into(),
                    version: 1,
                    num_shards: 5,
                    output_data_url: "/data/camvid_shards".into(),
                    output_catalog_url: "/data/camvid_shards/shards.yaml".into(),
                    num_samples: None,
                },
                json!({
                    "split": "train",
                    "parse_image": false,
                    "parse_label": false,
                    "shuffle_size": 800,
                    "shuffle_initial": 800,
                }),
            ),
            "kaggle_casting_quality" => (
                ShardConfig {
                    identifier: "kaggle_casting_quality".into(),
                    version: 1,
                    num_shards: 100,
                    output_data_url: "kaggle_casting_quality/train".into(),
                    output_catalog_url: "kaggle_casting_quality/train.yaml".into(),
                    num_samples: None,
                },
                json!({"split": "train", "parse": false}),
            ),
            _ => return None,
        };
        Some(Self {
            shard,
            iter_kwargs: kwargs.as_object().cloned().unwrap_or_default(),
            engine: EngineConfig::default(),
        })
    }

    /// Hooks a preset runs before sharding: its driver reads paths only, the
    /// files are loaded into the records here.
    #[must_use]
    pub fn preset_hooks(name: &str) -> HookChain {
        match name {
            "camvid" => HookChain::new().with(camvid::load_sample_hook()),
            "kaggle_casting_quality" => HookChain::new().with(casting::load_sample_hook()),
            _ => HookChain::new(),
        }
    }

    /// A [`SaveShards`] using this job's engine settings.
    #[must_use]
    pub fn save_shards(&self) -> SaveShards {
        SaveShards::new().with_runner(self.engine.runner())
    }
}
