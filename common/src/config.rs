// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Dynamic Configuration
//!
//! Runtime tunables live in a [`ConfigStore`]: a map from string keys to versioned,
//! `bincode`-encoded values. Services never talk to the store directly; they go through
//! [`DynamicConfig`], whose typed accessors materialize a key's default into the store the
//! first time it is read. After the first start every tunable is therefore visible (and
//! editable) in the store, even if nobody ever set it.
//!
//! Each write bumps the key's version and is announced as a [`ConfigChange`].

pub mod file;
pub mod keys;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

pub use keys::ConfigKey;

/// A stored value and the number of writes it has seen.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfigValue {
    pub bytes: Vec<u8>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    pub key: String,
    pub version: u64,
}

/// Raw key/value backend.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<ConfigValue>>;

    /// Stores `bytes` under `key` and returns the new version.
    fn set(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<u64>;

    fn contains(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange>;
}

/// Typed view over a [`ConfigStore`].
#[derive(Clone)]
pub struct DynamicConfig {
    store: Arc<dyn ConfigStore>,
}

impl DynamicConfig {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Convenience for tests and one-off tools.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(memory::MemoryConfigStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Reads `key`, writing its default into the store first if the key is absent.
    pub fn read<T>(&self, key: &ConfigKey<T>) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        match self.get::<T>(key.name)? {
            Some(value) => Ok(value),
            None => {
                self.set(key.name, &key.default)?;
                Ok(key.default.clone())
            }
        }
    }

    /// Reads a millisecond key as a `Duration`.
    pub fn read_millis(&self, key: &ConfigKey<u64>) -> anyhow::Result<Duration> {
        self.read(key).map(Duration::from_millis)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let Some(value) = self.store.get(key)? else {
            return Ok(None);
        };
        let decoded: T = bincode::deserialize(&value.bytes)
            .with_context(|| format!("config entry '{key}' has an unexpected type"))?;
        Ok(Some(decoded))
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<u64> {
        let bytes: Vec<u8> = bincode::serialize(value)
            .with_context(|| format!("encoding config entry '{key}'"))?;
        self.store.set(key, bytes)
    }

    pub fn contains(&self, key: &str) -> anyhow::Result<bool> {
        self.store.contains(key)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.store.subscribe()
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
