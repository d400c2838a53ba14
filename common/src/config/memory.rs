// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::anyhow;
use tokio::sync::broadcast;

use super::{ConfigChange, ConfigStore, ConfigValue};
use crate::events::Publisher;

/// Process-local store. Also the cache behind [`super::file::FileConfigStore`].
#[derive(Default)]
pub struct MemoryConfigStore {
    entries: Mutex<BTreeMap<String, ConfigValue>>,
    changes: Publisher<ConfigChange>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, ConfigValue>) -> Self {
        Self {
            entries: Mutex::new(entries),
            changes: Publisher::new(),
        }
    }

    pub fn snapshot(&self) -> anyhow::Result<BTreeMap<String, ConfigValue>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("config store poisoned"))?;
        Ok(entries.clone())
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<ConfigValue>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("config store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<u64> {
        let version: u64 = {
            let mut entries = self.entries.lock().map_err(|_| anyhow!("config store poisoned"))?;
            let entry = entries.entry(key.to_string()).or_insert(ConfigValue {
                bytes: Vec::new(),
                version: 0,
            });
            entry.bytes = bytes;
            entry.version += 1;
            entry.version
        };

        self.changes.publish(ConfigChange {
            key: key.to_string(),
            version,
        });
        Ok(version)
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}
