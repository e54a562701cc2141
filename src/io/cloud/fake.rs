//! In-memory [`ObjectIO`] for tests and local runs.

use super::traits::{CloudIOError, CloudResult, ErrorKind, ObjectIO, ObjectMetadata};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Shares its contents across clones.
///
/// `fail_next_puts(n)` makes the next `n` uploads fail with
/// `ServiceUnavailable`, which lets tests drive write failures.
#[derive(Clone, Default)]
pub struct FakeObjectIO {
    buckets: Arc<Mutex<Buckets>>,
    failing_puts: Arc<AtomicUsize>,
}

impl FakeObjectIO {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Keys of `bucket`, sorted.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectIO for FakeObjectIO {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        let injected = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CloudIOError::new(
                ErrorKind::ServiceUnavailable,
                format!("injected failure writing {bucket}/{key}"),
            ));
        }
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        self.lock()
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                CloudIOError::new(ErrorKind::NotFound, format!("object {bucket}/{key} not found"))
            })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()> {
        if let Some(b) = self.lock().get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>> {
        Ok(self
            .lock()
            .get(bucket)
            .into_iter()
            .flat_map(|b| b.iter())
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, data)| ObjectMetadata {
                key: key.clone(),
                size: data.len() as u64,
                custom_metadata: HashMap::new(),
            })
            .collect())
    }

    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool> {
        Ok(self.lock().get(bucket).is_some_and(|b| b.contains_key(key)))
    }
}
