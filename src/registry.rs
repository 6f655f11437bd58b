//! Name → store lookup.
//!
//! Stores are found by handle, not by global name. A [`Registry`] is the
//! place to keep handles that other parts of a program look up by name.

use crate::adapter::Adapter;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::storage::Store;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Shared map of named stores.
///
/// Cloning yields another view of the same map. Entries whose store has
/// stopped are treated as absent and replaced on the next registration.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    stores: Arc<RwLock<HashMap<String, Store>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a store named `name` and registers it.
    ///
    /// Fails with `AlreadyRegistered`, before running adapter setup, if a
    /// live store already holds the name.
    pub fn start<A: Adapter>(
        &self,
        name: &str,
        adapter: A,
        options: A::Options,
        mut config: StoreConfig,
    ) -> Result<Store, StoreError> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if stores.get(name).is_some_and(|s| !s.is_closed()) {
            return Err(StoreError::AlreadyRegistered(name.to_string()));
        }

        config.name = Some(name.to_string());
        let store = Store::start(adapter, options, config)?;
        stores.insert(name.to_string(), store.clone());

        info!(store = %name, "Registered store");
        Ok(store)
    }

    /// Registers an already running store under `name`.
    pub fn register(&self, name: &str, store: Store) -> Result<(), StoreError> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if stores.get(name).is_some_and(|s| !s.is_closed()) {
            return Err(StoreError::AlreadyRegistered(name.to_string()));
        }

        stores.insert(name.to_string(), store);
        debug!(store = %name, "Registered store");
        Ok(())
    }

    /// The live store registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Store> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.get(name).filter(|s| !s.is_closed()).cloned()
    }

    /// Removes the name. The store itself keeps running while other
    /// handles exist.
    pub fn unregister(&self, name: &str) -> Option<Store> {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        let removed = stores.remove(name);
        if removed.is_some() {
            debug!(store = %name, "Unregistered store");
        }
        removed
    }

    /// Names of live stores, sorted.
    pub fn names(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = stores
            .iter()
            .filter(|(_, s)| !s.is_closed())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
