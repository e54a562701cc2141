use super::{ShardStore, Stores};
use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Opens the underlying store on first use only.
///
/// A run whose partitions are all empty never touches the destination.
pub struct LazyStore<'a> {
    stores: &'a Stores,
    url: String,
    slot: Mutex<Option<Arc<dyn ShardStore>>>,
}

impl<'a> LazyStore<'a> {
    pub fn new(stores: &'a Stores, url: impl Into<String>) -> Self {
        Self {
            stores,
            url: url.into(),
            slot: Mutex::new(None),
        }
    }

    /// The store, opening it if this is the first call.
    ///
    /// # Errors
    /// Fails when opening fails; a later call tries again.
    pub fn get(&self) -> Result<Arc<dyn ShardStore>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = slot.as_ref() {
            return Ok(Arc::clone(store));
        }
        debug!(url = %self.url, "opening shard store");
        let store = self.stores.open(&self.url)?;
        *slot = Some(Arc::clone(&store));
        Ok(store)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_created_on_first_get() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("shards");
        let stores = Stores::new();
        let url = out.to_string_lossy().into_owned();
        let lazy = LazyStore::new(&stores, &url);
        assert!(!lazy.is_open());
        assert!(!out.exists());
        let a = lazy.get().unwrap();
        let b = lazy.get().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(out.is_dir());
    }
}
