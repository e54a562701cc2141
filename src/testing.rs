//! Helpers for testing shard runs and drivers.
//!
//! ```
//! use dataset_drivers::testing::*;
//!
//! let records = numbered_records(3);
//! assert_exact_coverage(&records, &[records[..1].to_vec(), records[1..].to_vec()]);
//! ```

use crate::io::cloud::{
    CloudIOError, CloudResult, ErrorKind, FakeObjectIO, ObjectIO, ObjectMetadata,
};
use crate::record::{Record, record_from};
use crate::store::ShardStore;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

/// `n` records `{"id": i, "text": "record-i"}`.
#[must_use]
pub fn numbered_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            record_from([
                ("id", Value::from(i)),
                ("text", Value::from(format!("record-{i}"))),
            ])
        })
        .collect()
}

/// Every stored shard, by key.
///
/// # Errors
/// Fails when the store cannot be listed or read.
pub fn read_all_shards(store: &dyn ShardStore) -> Result<BTreeMap<String, Vec<Record>>> {
    store
        .keys()?
        .into_iter()
        .map(|k| -> Result<(String, Vec<Record>)> {
            let records = store.get(&k)?;
            Ok((k, records))
        })
        .collect()
}

/// Assert that `shards` together hold each record of `expected` exactly once
/// and that no shard is empty.
///
/// # Panics
/// On lost, duplicated or unexpected records and on empty shards.
pub fn assert_exact_coverage(expected: &[Record], shards: &[Vec<Record>]) {
    let canon = |r: &Record| serde_json::to_string(r).unwrap_or_default();
    let mut want: BTreeMap<String, usize> = BTreeMap::new();
    for r in expected {
        *want.entry(canon(r)).or_default() += 1;
    }
    let mut got: BTreeMap<String, usize> = BTreeMap::new();
    for (i, shard) in shards.iter().enumerate() {
        assert!(!shard.is_empty(), "shard #{i} is empty");
        for r in shard {
            *got.entry(canon(r)).or_default() += 1;
        }
    }
    let total: usize = shards.iter().map(Vec::len).sum();
    assert_eq!(total, expected.len(), "record count mismatch");
    assert_eq!(got, want, "shard contents differ from input");
}

/// Object backend whose uploads always fail with a permanent error; reads are
/// served from an empty in-memory store.
#[derive(Clone, Default)]
pub struct FailingObjectIO {
    inner: FakeObjectIO,
}

impl ObjectIO for FailingObjectIO {
    fn put_object(&self, bucket: &str, key: &str, _data: &[u8]) -> CloudResult<()> {
        Err(CloudIOError::new(
            ErrorKind::PermissionDenied,
            format!("refusing to write {bucket}/{key}"),
        ))
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        self.inner.get_object(bucket, key)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        self.inner.delete_object(bucket, key)
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        self.inner.list_objects(bucket, prefix)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        self.inner.object_exists(bucket, key)
    }
}

/// Install a `RUST_LOG`-filtered fmt subscriber for the test binary. Safe to
/// call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
