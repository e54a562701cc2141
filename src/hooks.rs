//! Per-record transform hooks applied before sharding.
//!
//! A [`Hook`] maps one record to zero or one record, or fails. A [`HookChain`]
//! folds an ordered list of hooks into a single per-record function, which the
//! shard pipeline runs as one map stage right before repartitioning.

use crate::record::Record;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

type HookFn = dyn Fn(Record) -> Result<Option<Record>> + Send + Sync;

/// A single record transform.
#[derive(Clone)]
pub struct Hook {
    name: String,
    f: Arc<HookFn>,
}

impl Hook {
    /// General form: keep (`Some`), drop (`None`) or fail.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Record) -> Result<Option<Record>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn map<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        Self::new(name, move |r| Ok(Some(f(r))))
    }

    pub fn try_map<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Record) -> Result<Record> + Send + Sync + 'static,
    {
        Self::new(name, move |r| f(r).map(Some))
    }

    /// Keep only records for which `pred` holds.
    pub fn filter<F>(name: impl Into<String>, pred: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::new(name, move |r| Ok(pred(&r).then_some(r)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    /// Returns whatever the wrapped function returns.
    pub fn apply(&self, record: Record) -> Result<Option<Record>> {
        (self.f)(record)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

/// Ordered hooks, applied first to last.
#[derive(Clone, Debug, Default)]
pub struct HookChain {
    hooks: Vec<Hook>,
}

impl HookChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Names in application order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(Hook::name).collect()
    }

    /// Fold the record through every hook. Stops early when a hook drops the
    /// record or fails.
    ///
    /// # Errors
    /// Returns the first hook error as the hook produced it. The hook's name is
    /// logged, not attached.
    pub fn apply(&self, record: Record) -> Result<Option<Record>> {
        self.hooks.iter().try_fold(Some(record), |acc, hook| match acc {
            Some(r) => hook
                .apply(r)
                .inspect_err(|e| warn!(hook = %hook.name, error = %e, "hook failed")),
            None => Ok(None),
        })
    }
}

impl FromIterator<Hook> for HookChain {
    fn from_iter<I: IntoIterator<Item = Hook>>(iter: I) -> Self {
        Self {
            hooks: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::record_from;
    use anyhow::anyhow;
    use serde_json::Value;

    #[test]
    fn hooks_apply_in_order() {
        let chain = HookChain::new()
            .with(Hook::map("double", |mut r| {
                let v = r["x"].as_i64().unwrap() * 2;
                r.insert("x".into(), v.into());
                r
            }))
            .with(Hook::map("inc", |mut r| {
                let v = r["x"].as_i64().unwrap() + 1;
                r.insert("x".into(), v.into());
                r
            }));
        let out = chain.apply(record_from([("x", 5.into())])).unwrap().unwrap();
        assert_eq!(out["x"], Value::from(11));
        assert_eq!(chain.names(), vec!["double", "inc"]);
    }

    #[test]
    fn filter_short_circuits() {
        let chain = HookChain::new()
            .with(Hook::filter("drop_all", |_| false))
            .with(Hook::try_map("never", |_| Err(anyhow!("unreachable"))));
        assert!(chain.apply(record_from([("x", 1.into())])).unwrap().is_none());
    }

    #[test]
    fn hook_error_is_returned_unmodified() {
        let chain: HookChain = [Hook::try_map("decode", |_| Err(anyhow!("boom")))]
            .into_iter()
            .collect();
        let err = chain.apply(Record::new()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.chain().count(), 1);
    }
}
