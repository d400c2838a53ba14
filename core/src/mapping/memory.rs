// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use natwarden_common::error::{NatError, NatResult};
use natwarden_common::models::identity::UserId;
use natwarden_common::models::mapping::{ManagedMapping, MappingId};

use super::MappingRepository;

/// Repository kept entirely in process memory; contents are lost on restart.
#[derive(Default)]
pub struct MemoryMappingRepository {
    rows: Mutex<BTreeMap<MappingId, ManagedMapping>>,
}

impl MemoryMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingRepository for MemoryMappingRepository {
    async fn get_by_id(&self, id: MappingId) -> NatResult<Option<ManagedMapping>> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn get_all(&self) -> NatResult<Vec<ManagedMapping>> {
        Ok(self.rows.lock().await.values().cloned().collect())
    }

    async fn get_by_owner(&self, owner: UserId) -> NatResult<Vec<ManagedMapping>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect())
    }

    async fn insert(&self, mapping: &ManagedMapping) -> NatResult<()> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&mapping.id) {
            return Err(NatError::DuplicateEntry);
        }
        rows.insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn update(&self, mapping: &ManagedMapping) -> NatResult<()> {
        let mut rows = self.rows.lock().await;
        let row: &mut ManagedMapping = rows
            .get_mut(&mapping.id)
            .ok_or_else(|| NatError::Storage(format!("mapping {} does not exist", mapping.id)))?;
        *row = mapping.clone();
        Ok(())
    }

    async fn delete(&self, id: MappingId) -> NatResult<()> {
        match self.rows.lock().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(NatError::Storage(format!("mapping {id} does not exist"))),
        }
    }
}
