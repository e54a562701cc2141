//! # dataset-drivers
//!
//! Dataset drivers for streaming ML data loading, a versioned catalog that
//! maps `(identifier, version)` to a driver, and a shard export pipeline that
//! turns any catalog entry into a new, sharded version of itself.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dataset_drivers::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let registry = DriverRegistry::with_builtin();
//! let catalog = Catalog::from_file("catalog.yaml")?;
//!
//! let cfg = ShardConfig {
//!     identifier: "camvid".into(),
//!     version: 1,
//!     num_shards: 5,
//!     output_data_url: "/data/camvid_shards".into(),
//!     output_catalog_url: "/data/camvid_shards/shards.yaml".into(),
//!     num_samples: None,
//! };
//! let kwargs = serde_json::json!({"split": "train"});
//! let report = SaveShards::new()
//!     .hook(drivers::camvid::load_sample_hook())
//!     .save_source(&cfg, &catalog, &registry, kwargs.as_object().unwrap())?;
//!
//! // The new catalog serves the shards as `camvid@2`.
//! let sharded = Catalog::from_file(&cfg.output_catalog_url)?;
//! let records = sharded
//!     .get("camvid", 2)
//!     .unwrap()
//!     .get_iter(&registry, &IterKwargs::new())?
//!     .collect()?;
//! assert_eq!(records.len(), report.records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concepts
//!
//! - A [`Driver`] yields a lazy [`RecordStream`] of [`Record`]s (JSON objects).
//!   Drivers are constructed by name through a [`DriverRegistry`], which also
//!   owns the [`Stores`] that drivers read object-backed data through.
//!   [`Driver::get_iter_with_hooks`] runs [`StreamHook`]s on the stream before
//!   file-loading drivers read any payload.
//! - A [`Catalog`] stores which driver, with which arguments, serves each
//!   dataset version.
//! - [`SaveShards`] reads a stream, applies a [`HookChain`], regroups the
//!   records into `num_shards` partitions on the in-process engine
//!   ([`Pipeline`], [`PCollection`], [`Runner`]) and writes each non-empty
//!   partition to a [`ShardStore`] before registering the output.
//!
//! Logging goes through `tracing`; the crate never installs a subscriber.

pub mod catalog;
pub mod collection;
pub mod config;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod hooks;
pub mod io;
pub mod node;
pub mod node_id;
pub mod pipeline;
pub mod planner;
pub mod preprocessing;
pub mod record;
pub mod registry;
pub mod runner;
pub mod store;
pub mod stream;
pub mod testing;
pub mod type_token;
pub mod utils;

pub use catalog::{Catalog, CatalogFormat, CatalogKey, Source};
pub use collection::{PCollection, RFBound, from_vec};
pub use config::{EngineConfig, ShardJobConfig};
pub use driver::{Driver, DriverCtor, IterKwargs};
pub use error::ShardError;
pub use hooks::{Hook, HookChain};
pub use node_id::NodeId;
pub use pipeline::Pipeline;
pub use preprocessing::{
    RunState, SaveShards, ShardConfig, ShardReport, update_catalog, write_partition,
};
pub use record::Record;
pub use registry::{DriverRegistry, Plugin};
pub use runner::{ExecMode, Runner};
pub use store::{LazyStore, ShardStore, Stores, shard_key};
pub use stream::{RecordStream, StreamHook, stream_hook};
pub use type_token::Partition;
