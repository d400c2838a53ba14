// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Config store persisted as a single `bincode` snapshot.
//!
//! Every write rewrites the whole file through a temporary sibling and a rename, so a crash
//! mid-write leaves the previous snapshot in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use tokio::sync::broadcast;

use super::memory::MemoryConfigStore;
use super::{ConfigChange, ConfigStore, ConfigValue};
use crate::debug;

pub struct FileConfigStore {
    path: PathBuf,
    cache: MemoryConfigStore,
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();

        let entries: BTreeMap<String, ConfigValue> = if path.exists() {
            let bytes: Vec<u8> =
                fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            bincode::deserialize(&bytes)
                .with_context(|| format!("{} is not a config snapshot", path.display()))?
        } else {
            debug!("No config snapshot at {}, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            cache: MemoryConfigStore::from_entries(entries),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> anyhow::Result<()> {
        let snapshot: BTreeMap<String, ConfigValue> = self.cache.snapshot()?;
        let bytes: Vec<u8> = bincode::serialize(&snapshot)?;

        let tmp: PathBuf = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<ConfigValue>> {
        self.cache.get(key)
    }

    fn set(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().map_err(|_| anyhow!("config store poisoned"))?;
        let version: u64 = self.cache.set(key, bytes)?;
        self.persist()?;
        Ok(version)
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.cache.subscribe()
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
