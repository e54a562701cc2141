//! Explicit name -> constructor registry for drivers and named sources.
//!
//! Plugins contribute drivers and catalog sources. A registry is built once per
//! run and passed by reference to whatever needs lookups. Drivers are built
//! with the registry's [`Stores`], so a catalog entry pointing at an object URL
//! opens through the same backends the shards were written with.

use crate::catalog::{CatalogKey, Source};
use crate::driver::{Driver, DriverCtor, IterKwargs};
use crate::store::Stores;
use anyhow::{Result, anyhow, bail};
use std::collections::BTreeMap;
use tracing::debug;

/// A bundle of drivers and sources.
pub trait Plugin {
    fn name(&self) -> &str;

    fn drivers(&self) -> Vec<(&'static str, DriverCtor)>;

    fn sources(&self) -> Vec<(CatalogKey, Source)> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, DriverCtor>,
    sources: Vec<(CatalogKey, Source)>,
    stores: Stores,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the drivers and sources shipped with this crate.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        let builtin = crate::drivers::Builtin;
        for (name, ctor) in builtin.drivers() {
            reg.drivers.insert(name.to_string(), ctor);
        }
        reg.sources = builtin.sources();
        reg
    }

    /// Storage backends handed to driver constructors.
    #[must_use]
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = stores;
        self
    }

    #[must_use]
    pub const fn stores(&self) -> &Stores {
        &self.stores
    }

    /// # Errors
    /// Fails when `name` is already registered.
    pub fn register_driver(&mut self, name: &str, ctor: DriverCtor) -> Result<()> {
        if self.drivers.contains_key(name) {
            bail!("driver `{name}` is already registered");
        }
        self.drivers.insert(name.to_string(), ctor);
        Ok(())
    }

    /// Add every driver and source of `plugin`. Nothing is added when one of its
    /// driver names is taken.
    ///
    /// # Errors
    /// Fails on duplicate driver names.
    pub fn register_plugin(&mut self, plugin: &dyn Plugin) -> Result<()> {
        let drivers = plugin.drivers();
        if let Some((name, _)) = drivers.iter().find(|(name, _)| self.drivers.contains_key(*name)) {
            bail!("plugin `{}`: driver `{name}` is already registered", plugin.name());
        }
        debug!(plugin = plugin.name(), drivers = drivers.len(), "registering plugin");
        for (name, ctor) in drivers {
            self.register_driver(name, ctor)?;
        }
        self.sources.extend(plugin.sources());
        Ok(())
    }

    /// Registered driver names, sorted.
    #[must_use]
    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Construct driver `name` with `kwargs`.
    ///
    /// # Errors
    /// Unknown names and constructor failures.
    pub fn create(&self, name: &str, kwargs: &IterKwargs) -> Result<Box<dyn Driver>> {
        let ctor = self
            .drivers
            .get(name)
            .ok_or_else(|| anyhow!("unknown driver `{name}`"))?;
        ctor(kwargs, &self.stores)
    }

    #[must_use]
    pub fn sources(&self) -> &[(CatalogKey, Source)] {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::RecordStream;

    struct Empty;
    impl Driver for Empty {
        fn name(&self) -> &'static str {
            "empty"
        }
        fn get_iter(&self, _: &IterKwargs) -> Result<RecordStream> {
            Ok(RecordStream::empty())
        }
    }

    fn make_empty(_: &IterKwargs, _: &Stores) -> Result<Box<dyn Driver>> {
        Ok(Box::new(Empty))
    }

    struct Extra(&'static str);
    impl Plugin for Extra {
        fn name(&self) -> &str {
            "extra"
        }
        fn drivers(&self) -> Vec<(&'static str, DriverCtor)> {
            vec![("empty", make_empty as DriverCtor), (self.0, make_empty as DriverCtor)]
        }
        fn sources(&self) -> Vec<(CatalogKey, Source)> {
            vec![(CatalogKey::new("empty", 1), Source::new("empty"))]
        }
    }

    #[test]
    fn plugins_add_drivers_and_sources() {
        let mut reg = DriverRegistry::new();
        reg.register_plugin(&Extra("also_empty")).unwrap();
        assert_eq!(reg.driver_names(), vec!["also_empty", "empty"]);
        assert_eq!(reg.sources().len(), 1);
        assert_eq!(reg.create("empty", &IterKwargs::new()).unwrap().name(), "empty");
        assert!(reg.create("nope", &IterKwargs::new()).is_err());
    }

    #[test]
    fn duplicate_names_leave_registry_untouched() {
        let mut reg = DriverRegistry::new();
        reg.register_driver("empty", make_empty).unwrap();
        assert!(reg.register_plugin(&Extra("fresh")).is_err());
        assert!(!reg.contains("fresh"));
        assert!(reg.sources().is_empty());
    }
}
