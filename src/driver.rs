//! The driver interface and typed access to its keyword arguments.

use crate::store::Stores;
use crate::stream::{RecordStream, StreamHook};
use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};

/// Free-form arguments for `Driver::get_iter` and driver constructors.
pub type IterKwargs = Map<String, Value>;

/// Builds a driver from its catalog `driver_kwargs`. `Stores` resolves the
/// storage URLs a driver reads from (see [`crate::DriverRegistry::with_stores`]).
pub type DriverCtor = fn(&IterKwargs, &Stores) -> Result<Box<dyn Driver>>;

/// A per-dataset adapter exposing the records of one source.
pub trait Driver: Send + Sync {
    /// Registry name, e.g. `"camvid"`.
    fn name(&self) -> &'static str;

    /// A fresh, lazy stream over the dataset.
    ///
    /// # Errors
    /// Fails on invalid arguments or when the source cannot be opened.
    /// Per-record read failures arrive as `Err` items in the stream.
    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream>;

    /// [`get_iter`](Driver::get_iter) with stream hooks. Drivers that load
    /// file contents run the hooks on the listing, before anything is read;
    /// the rest apply them to the finished stream.
    ///
    /// # Errors
    /// As [`get_iter`](Driver::get_iter).
    fn get_iter_with_hooks(
        &self,
        kwargs: &IterKwargs,
        hooks: &[StreamHook],
    ) -> Result<RecordStream> {
        Ok(self.get_iter(kwargs)?.through(hooks))
    }
}

/// Typed reads from an [`IterKwargs`] map. Errors name the driver and key.
#[derive(Clone, Copy)]
pub struct Kwargs<'a> {
    map: &'a IterKwargs,
    owner: &'a str,
}

impl<'a> Kwargs<'a> {
    #[must_use]
    pub const fn new(map: &'a IterKwargs, owner: &'a str) -> Self {
        Self { map, owner }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn wrong_type(&self, key: &str, want: &str) -> anyhow::Error {
        anyhow!("{}: argument `{key}` must be {want}", self.owner)
    }

    /// # Errors
    /// Missing key or non-string value.
    pub fn required_str(&self, key: &str) -> Result<&'a str> {
        let v = self
            .present(key)
            .ok_or_else(|| anyhow!("{}: missing argument `{key}`", self.owner))?;
        v.as_str().ok_or_else(|| self.wrong_type(key, "a string"))
    }

    /// # Errors
    /// Non-string value.
    pub fn str_or(&self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.present(key) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| self.wrong_type(key, "a string")),
        }
    }

    /// # Errors
    /// Non-string value.
    pub fn opt_str(&self, key: &str) -> Result<Option<&'a str>> {
        self.present(key)
            .map(|v| v.as_str().ok_or_else(|| self.wrong_type(key, "a string")))
            .transpose()
    }

    /// # Errors
    /// Non-boolean value.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.present(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| self.wrong_type(key, "a boolean")),
        }
    }

    /// # Errors
    /// Value that is not a non-negative integer.
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.present(key) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| self.wrong_type(key, "a non-negative integer")),
        }
    }

    /// # Errors
    /// Value that is not a non-negative integer.
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.present(key) {
            None => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| self.wrong_type(key, "a non-negative integer")),
        }
    }

    /// A string or a list of strings; `None` when absent.
    ///
    /// # Errors
    /// Any other value.
    pub fn str_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.wrong_type(key, "a string or a list of strings"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.wrong_type(key, "a string or a list of strings")),
        }
    }

    /// A string-to-string map; `None` when absent.
    ///
    /// # Errors
    /// Any other value.
    pub fn str_map(&self, key: &str) -> Result<Option<Vec<(String, String)>>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Object(m)) => m
                .iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|s| (k.clone(), s.to_string()))
                        .ok_or_else(|| self.wrong_type(key, "a map of strings"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.wrong_type(key, "a map of strings")),
        }
    }

    /// `split` restricted to `allowed`, defaulting to `default`.
    ///
    /// # Errors
    /// Unknown split names.
    pub fn split(&self, allowed: &[&str], default: &'a str) -> Result<&'a str> {
        let split = self.str_or("split", default)?;
        if !allowed.contains(&split) {
            bail!("{}: unknown split `{split}`, expected one of {allowed:?}", self.owner);
        }
        Ok(split)
    }
}
