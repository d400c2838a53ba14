// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Mapping Store
//!
//! Authorizes, validates and persists the desired port mappings.
//!
//! ## Rules
//! - A caller may act on a mapping it owns; anything else needs `ManageMappings`.
//! - Two *enabled* mappings may never share `(public port, protocol)`.
//! - Every accepted change is written to the [`MappingRepository`] first and announced as a
//!   [`MappingEvent`] afterwards.
//!
//! The uniqueness check and the write it guards are separate repository calls. Two concurrent
//! updates that both pass the check are settled by whichever write lands last.

use std::sync::Arc;

use async_trait::async_trait;
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use natwarden_common::cancel::CancelToken;
use natwarden_common::error::{NatError, NatResult, SharedErrorSink};
use natwarden_common::events::{Publisher, spawn_listener};
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::models::mapping::{ManagedMapping, MappingConfig, MappingId, Protocol};
use natwarden_common::utils::{mac, time};
use natwarden_common::{debug, info, warn};

use crate::identity::{IdentityDirectory, IdentityEvent, identity_exists};

pub mod memory;

pub use memory::MemoryMappingRepository;

/// Persistence backend for managed mappings.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    async fn get_by_id(&self, id: MappingId) -> NatResult<Option<ManagedMapping>>;

    async fn get_all(&self) -> NatResult<Vec<ManagedMapping>>;

    async fn get_by_owner(&self, owner: UserId) -> NatResult<Vec<ManagedMapping>>;

    /// Fails with `DuplicateEntry` if the id is already stored.
    async fn insert(&self, mapping: &ManagedMapping) -> NatResult<()>;

    /// Fails with `Storage` if the row does not exist.
    async fn update(&self, mapping: &ManagedMapping) -> NatResult<()>;

    /// Fails with `Storage` if the row does not exist.
    async fn delete(&self, id: MappingId) -> NatResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingEvent {
    Created {
        mapping: ManagedMapping,
        caller: UserId,
    },
    Updated {
        old: ManagedMapping,
        new: ManagedMapping,
        caller: UserId,
    },
    /// `caller` is `None` when the mapping went away with its owner.
    Deleted {
        mapping: ManagedMapping,
        caller: Option<UserId>,
    },
}

/// Arguments of [`MappingStore::create`]. The MAC arrives as raw bytes and is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMapping {
    pub owner: UserId,
    pub protocol: Protocol,
    pub private_port: u16,
    pub public_port: u16,
    pub mac: Vec<u8>,
    pub description: Option<String>,
    pub enabled: bool,
}

/// Full replacement of a mapping's editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingUpdate {
    pub protocol: Protocol,
    pub private_port: u16,
    pub public_port: u16,
    pub mac: Vec<u8>,
    pub description: Option<String>,
    pub enabled: bool,
}

impl From<&ManagedMapping> for MappingUpdate {
    fn from(mapping: &ManagedMapping) -> Self {
        Self {
            protocol: mapping.protocol,
            private_port: mapping.private_port,
            public_port: mapping.public_port,
            mac: mac::to_bytes(mapping.mac).to_vec(),
            description: Some(mapping.description.clone()),
            enabled: mapping.enabled,
        }
    }
}

fn validate(
    protocol: Protocol,
    private_port: u16,
    public_port: u16,
    mac_bytes: &[u8],
    description: Option<String>,
    enabled: bool,
) -> NatResult<MappingConfig> {
    let mac: MacAddr = mac::from_bytes(mac_bytes)
        .ok_or_else(|| NatError::InvalidArgument(format!("MAC must be 6 bytes, got {}", mac_bytes.len())))?;

    if private_port == 0 || public_port == 0 {
        return Err(NatError::InvalidArgument("ports must be non-zero".into()));
    }

    Ok(MappingConfig {
        protocol,
        private_port,
        public_port,
        mac,
        description: description.unwrap_or_default(),
        enabled,
    })
}

fn is_owner_or_privileged(caller: &UserInfo, owner: UserId) -> bool {
    caller.id == owner || caller.can(Permissions::MANAGE_MAPPINGS)
}

pub struct MappingStore {
    repository: Arc<dyn MappingRepository>,
    identities: Arc<dyn IdentityDirectory>,
    events: Publisher<MappingEvent>,
}

impl MappingStore {
    pub fn new(
        repository: Arc<dyn MappingRepository>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            repository,
            identities,
            events: Publisher::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MappingEvent> {
        self.events.subscribe()
    }

    async fn caller_info(&self, caller: UserId) -> NatResult<UserInfo> {
        self.identities.get_user_info(caller).await
    }

    async fn fetch(&self, id: MappingId) -> NatResult<ManagedMapping> {
        self.repository.get_by_id(id).await?.ok_or(NatError::EntryNotFound)
    }

    /// `PortUnavailable` if another enabled mapping already claims the port.
    async fn ensure_port_free(
        &self,
        config: &MappingConfig,
        except: Option<MappingId>,
    ) -> NatResult<()> {
        if !config.enabled {
            return Ok(());
        }

        let taken: bool = self.repository.get_all().await?.iter().any(|other| {
            Some(other.id) != except && other.occupies(config.public_port, config.protocol)
        });
        if taken {
            return Err(NatError::PortUnavailable(config.public_port));
        }
        Ok(())
    }

    pub async fn create(&self, caller: UserId, request: NewMapping) -> NatResult<ManagedMapping> {
        let caller_info: UserInfo = self.caller_info(caller).await?;
        if !is_owner_or_privileged(&caller_info, request.owner) {
            return Err(NatError::Unauthorized);
        }

        let config: MappingConfig = validate(
            request.protocol,
            request.private_port,
            request.public_port,
            &request.mac,
            request.description,
            request.enabled,
        )?;

        self.ensure_port_free(&config, None).await?;

        let mapping: ManagedMapping = ManagedMapping {
            id: MappingId::new_random(),
            owner: request.owner,
            protocol: config.protocol,
            private_port: config.private_port,
            public_port: config.public_port,
            mac: config.mac,
            description: config.description,
            enabled: config.enabled,
            created_at: time::unix_now(),
            created_by: caller,
        };
        self.repository.insert(&mapping).await?;

        self.events.publish(MappingEvent::Created {
            mapping: mapping.clone(),
            caller,
        });
        Ok(mapping)
    }

    pub async fn delete(&self, caller: UserId, id: MappingId) -> NatResult<()> {
        let caller_info: UserInfo = self.caller_info(caller).await?;

        let mapping: ManagedMapping = self.fetch(id).await?;
        if !is_owner_or_privileged(&caller_info, mapping.owner) {
            return Err(NatError::Unauthorized);
        }
        self.repository.delete(id).await?;

        self.events.publish(MappingEvent::Deleted {
            mapping,
            caller: Some(caller),
        });
        Ok(())
    }

    /// Hands a mapping to `new_owner`. The caller must be allowed to act on both the current
    /// and the new owner's behalf, and the new owner must exist.
    pub async fn set_owner(
        &self,
        caller: UserId,
        id: MappingId,
        new_owner: UserId,
    ) -> NatResult<ManagedMapping> {
        let caller_info: UserInfo = self.caller_info(caller).await?;
        if !is_owner_or_privileged(&caller_info, new_owner) {
            return Err(NatError::Unauthorized);
        }
        if !identity_exists(self.identities.as_ref(), new_owner).await? {
            return Err(NatError::EntryNotFound);
        }

        let old: ManagedMapping = self.fetch(id).await?;
        if !is_owner_or_privileged(&caller_info, old.owner) {
            return Err(NatError::Unauthorized);
        }
        let new: ManagedMapping = old.with_owner(new_owner);
        self.repository.update(&new).await?;

        self.events.publish(MappingEvent::Updated {
            old,
            new: new.clone(),
            caller,
        });
        Ok(new)
    }

    pub async fn update_config(
        &self,
        caller: UserId,
        id: MappingId,
        update: MappingUpdate,
    ) -> NatResult<ManagedMapping> {
        let caller_info: UserInfo = self.caller_info(caller).await?;
        let config: MappingConfig = validate(
            update.protocol,
            update.private_port,
            update.public_port,
            &update.mac,
            update.description,
            update.enabled,
        )?;

        let old: ManagedMapping = self.fetch(id).await?;
        if !is_owner_or_privileged(&caller_info, old.owner) {
            return Err(NatError::Unauthorized);
        }
        self.ensure_port_free(&config, Some(id)).await?;

        let new: ManagedMapping = old.with_config(config);
        self.repository.update(&new).await?;

        self.events.publish(MappingEvent::Updated {
            old,
            new: new.clone(),
            caller,
        });
        Ok(new)
    }

    async fn modify<F>(&self, caller: UserId, id: MappingId, edit: F) -> NatResult<ManagedMapping>
    where
        F: FnOnce(&mut MappingUpdate) + Send,
    {
        let mut update: MappingUpdate = MappingUpdate::from(&self.fetch(id).await?);
        edit(&mut update);
        self.update_config(caller, id, update).await
    }

    pub async fn set_description(
        &self,
        caller: UserId,
        id: MappingId,
        description: String,
    ) -> NatResult<ManagedMapping> {
        self.modify(caller, id, |u| u.description = Some(description)).await
    }

    pub async fn set_public_port(
        &self,
        caller: UserId,
        id: MappingId,
        port: u16,
    ) -> NatResult<ManagedMapping> {
        self.modify(caller, id, |u| u.public_port = port).await
    }

    pub async fn set_private_port(
        &self,
        caller: UserId,
        id: MappingId,
        port: u16,
    ) -> NatResult<ManagedMapping> {
        self.modify(caller, id, |u| u.private_port = port).await
    }

    pub async fn set_mac(
        &self,
        caller: UserId,
        id: MappingId,
        mac: Vec<u8>,
    ) -> NatResult<ManagedMapping> {
        self.modify(caller, id, |u| u.mac = mac).await
    }

    pub async fn set_enabled(
        &self,
        caller: UserId,
        id: MappingId,
        enabled: bool,
    ) -> NatResult<ManagedMapping> {
        self.modify(caller, id, |u| u.enabled = enabled).await
    }

    pub async fn get_by_id(&self, caller: UserId, id: MappingId) -> NatResult<ManagedMapping> {
        let caller_info: UserInfo = self.caller_info(caller).await?;
        let mapping: ManagedMapping = self.fetch(id).await?;
        if !is_owner_or_privileged(&caller_info, mapping.owner) {
            return Err(NatError::Unauthorized);
        }
        Ok(mapping)
    }

    pub async fn get_all(&self, caller: UserId) -> NatResult<Vec<ManagedMapping>> {
        let caller_info: UserInfo = self.caller_info(caller).await?;
        if !caller_info.can(Permissions::MANAGE_MAPPINGS) {
            return Err(NatError::Unauthorized);
        }
        self.repository.get_all().await
    }

    pub async fn get_by_owner(
        &self,
        caller: UserId,
        owner: UserId,
    ) -> NatResult<Vec<ManagedMapping>> {
        let caller_info: UserInfo = self.caller_info(caller).await?;
        if !is_owner_or_privileged(&caller_info, owner) {
            return Err(NatError::Unauthorized);
        }
        self.repository.get_by_owner(owner).await
    }

    /// Every stored mapping, bypassing authorization. For in-process consumers only.
    pub async fn snapshot(&self) -> NatResult<Vec<ManagedMapping>> {
        self.repository.get_all().await
    }

    /// Deletes every mapping owned by `owner`, announcing each without a caller.
    ///
    /// Each row is announced as soon as it is gone. A row that fails to delete does not stop
    /// the rest; the first failure is returned once every row has been tried. A row that
    /// vanished in the meantime counts as already deleted.
    pub async fn handle_identity_deleted(&self, owner: UserId) -> NatResult<usize> {
        let owned: Vec<ManagedMapping> = self.repository.get_by_owner(owner).await?;

        let mut removed: usize = 0;
        let mut first_failure: Option<NatError> = None;
        for mapping in owned {
            match self.repository.delete(mapping.id).await {
                Ok(()) => {
                    removed += 1;
                    info!("Mapping {} removed along with its owner {owner}", mapping.id);
                    self.events.publish(MappingEvent::Deleted { mapping, caller: None });
                }
                Err(NatError::Storage(_)) if self.is_gone(mapping.id).await => {
                    debug!("Mapping {} was already gone", mapping.id);
                }
                Err(e) => {
                    warn!("Could not remove mapping {} of deleted owner {owner}: {e}", mapping.id);
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    async fn is_gone(&self, id: MappingId) -> bool {
        matches!(self.repository.get_by_id(id).await, Ok(None))
    }

    /// Removes mappings whose owner no longer exists. Run once at start-up.
    pub async fn clean_orphans(&self) -> NatResult<usize> {
        let mut owners: Vec<UserId> = self.repository.get_all().await?.iter().map(|m| m.owner).collect();
        owners.sort();
        owners.dedup();

        let mut removed: usize = 0;
        let mut first_failure: Option<NatError> = None;
        for owner in owners {
            if identity_exists(self.identities.as_ref(), owner).await? {
                continue;
            }
            match self.handle_identity_deleted(owner).await {
                Ok(count) => removed += count,
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }

        debug!("Orphan cleanup removed {removed} mappings");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Keeps the store free of orphans while the daemon runs.
    pub fn spawn_orphan_listener(
        self: &Arc<Self>,
        shutdown: &CancelToken,
        errors: SharedErrorSink,
    ) -> JoinHandle<()> {
        let this: Arc<Self> = self.clone();
        spawn_listener(
            "orphan cleanup",
            self.identities.subscribe(),
            shutdown.clone(),
            move |event: IdentityEvent| {
                let this: Arc<Self> = this.clone();
                let errors: SharedErrorSink = errors.clone();
                async move {
                    if let IdentityEvent::Deleted(owner) = event
                        && let Err(e) = this.handle_identity_deleted(owner).await
                    {
                        errors.report("orphan cleanup", &anyhow::Error::new(e));
                    }
                }
            },
        )
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
