// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Who may call the daemon, and with which permissions.
//!
//! Credentials live elsewhere; the directory only answers "does this id exist, is it
//! enabled, what may it do" and announces deletions so mappings can be cleaned up.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use natwarden_common::error::{NatError, NatResult};
use natwarden_common::events::Publisher;
use natwarden_common::models::identity::{UserId, UserInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    Created(UserInfo),
    Updated(UserInfo),
    Deleted(UserId),
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Fails with `EntryNotFound` for unknown ids and `AccountDisabled` for disabled ones.
    async fn get_user_info(&self, id: UserId) -> NatResult<UserInfo>;

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent>;
}

/// Whether `id` is known to the directory at all, enabled or not.
pub async fn identity_exists(directory: &dyn IdentityDirectory, id: UserId) -> NatResult<bool> {
    match directory.get_user_info(id).await {
        Ok(_) | Err(NatError::AccountDisabled) => Ok(true),
        Err(NatError::EntryNotFound) => Ok(false),
        Err(other) => Err(other),
    }
}

#[derive(Default)]
pub struct MemoryIdentityDirectory {
    users: Mutex<BTreeMap<UserId, UserInfo>>,
    events: Publisher<IdentityEvent>,
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, info: UserInfo) -> NatResult<()> {
        {
            let mut users = self.users.lock().await;
            if users.contains_key(&info.id) {
                return Err(NatError::DuplicateEntry);
            }
            users.insert(info.id, info.clone());
        }
        self.events.publish(IdentityEvent::Created(info));
        Ok(())
    }

    pub async fn update(&self, info: UserInfo) -> NatResult<()> {
        {
            let mut users = self.users.lock().await;
            let slot: &mut UserInfo = users.get_mut(&info.id).ok_or(NatError::EntryNotFound)?;
            *slot = info.clone();
        }
        self.events.publish(IdentityEvent::Updated(info));
        Ok(())
    }

    pub async fn set_enabled(&self, id: UserId, enabled: bool) -> NatResult<()> {
        let updated: UserInfo = {
            let mut users = self.users.lock().await;
            let slot: &mut UserInfo = users.get_mut(&id).ok_or(NatError::EntryNotFound)?;
            slot.enabled = enabled;
            slot.clone()
        };
        self.events.publish(IdentityEvent::Updated(updated));
        Ok(())
    }

    pub async fn delete(&self, id: UserId) -> NatResult<()> {
        if self.users.lock().await.remove(&id).is_none() {
            return Err(NatError::EntryNotFound);
        }
        self.events.publish(IdentityEvent::Deleted(id));
        Ok(())
    }

    pub async fn all(&self) -> Vec<UserInfo> {
        self.users.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn get_user_info(&self, id: UserId) -> NatResult<UserInfo> {
        let info: UserInfo = self
            .users
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(NatError::EntryNotFound)?;

        if !info.enabled {
            return Err(NatError::AccountDisabled);
        }
        Ok(info)
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
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
