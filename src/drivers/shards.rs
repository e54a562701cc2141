//! Reads back a shard store written by the shard pipeline.

use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::store::{DEFAULT_EXTENSION, ShardStore, Stores};
use crate::stream::{RecordStream, StreamItem};
use anyhow::Result;
use std::sync::Arc;

pub const NAME: &str = "jsonl_shards";

/// Driver behind catalog entries produced by `SaveShards`.
///
/// Arguments: `url` (required), `extension` (default `jsonl.gz`).
/// Shards are read lazily, one key at a time, in index order. Object URLs
/// resolve through the backends registered on the constructing registry.
pub struct JsonlShards {
    url: String,
    stores: Stores,
}

impl JsonlShards {
    /// # Errors
    /// Missing `url`.
    pub fn from_kwargs(kwargs: &IterKwargs, stores: &Stores) -> Result<Self> {
        let k = Kwargs::new(kwargs, NAME);
        Ok(Self {
            url: k.required_str("url")?.to_string(),
            stores: stores
                .clone()
                .with_extension(k.str_or("extension", DEFAULT_EXTENSION)?),
        })
    }
}

fn shard_index(key: &str) -> (usize, &str) {
    let index = key
        .strip_prefix("shard_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX);
    (index, key)
}

impl Driver for JsonlShards {
    fn name(&self) -> &'static str {
        NAME
    }

    fn get_iter(&self, _kwargs: &IterKwargs) -> Result<RecordStream> {
        let store: Arc<dyn ShardStore> = self.stores.open_existing(&self.url)?;
        let mut keys = store.keys()?;
        keys.sort_by(|a, b| shard_index(a).cmp(&shard_index(b)));
        Ok(RecordStream::new(keys.into_iter().flat_map(move |key| {
            let rows: Box<dyn Iterator<Item = StreamItem> + Send> = match store.records(&key) {
                Ok(rows) => Box::new(rows),
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
            rows
        })))
    }
}
