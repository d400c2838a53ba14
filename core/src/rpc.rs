// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Remote procedure facade.
//!
//! A transport resolves the session's identity and hands it over together with a typed
//! [`RpcRequest`]. Every failure leaves this module as an [`RpcError`] carrying the stable
//! code and caller-safe message of the underlying [`NatError`].

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use natwarden_common::error::{NatError, NatResult};
use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::models::host::NetworkHost;
use natwarden_common::models::identity::UserId;
use natwarden_common::models::mapping::{ManagedMapping, MappingId};
use natwarden_common::{debug, error};

use crate::daemon::DaemonManager;
use crate::mapping::{MappingStore, MappingUpdate, NewMapping};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RpcRequest {
    CreateMapping(NewMapping),
    DeleteMapping { id: MappingId },
    SetMappingOwner { id: MappingId, owner: UserId },
    UpdateMapping { id: MappingId, update: MappingUpdate },
    GetMappingInfo { id: MappingId },
    GetAllMappings,
    GetUsersMappings { owner: UserId },
    GetAllHosts,
    GetExternalAddress,
    GetBehaviourMode,
    SetBehaviourMode { mode: BehaviourMode, permanent: bool },
}

impl RpcRequest {
    pub fn name(&self) -> &'static str {
        match self {
            RpcRequest::CreateMapping(_) => "CreateMapping",
            RpcRequest::DeleteMapping { .. } => "DeleteMapping",
            RpcRequest::SetMappingOwner { .. } => "SetMappingOwner",
            RpcRequest::UpdateMapping { .. } => "UpdateMapping",
            RpcRequest::GetMappingInfo { .. } => "GetMappingInfo",
            RpcRequest::GetAllMappings => "GetAllMappings",
            RpcRequest::GetUsersMappings { .. } => "GetUsersMappings",
            RpcRequest::GetAllHosts => "GetAllHosts",
            RpcRequest::GetExternalAddress => "GetExternalAddress",
            RpcRequest::GetBehaviourMode => "GetBehaviourMode",
            RpcRequest::SetBehaviourMode { .. } => "SetBehaviourMode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum RpcResponse {
    Done,
    Mapping(ManagedMapping),
    Mappings(Vec<ManagedMapping>),
    Hosts(Vec<NetworkHost>),
    ExternalAddress(Option<Ipv4Addr>),
    BehaviourMode(BehaviourMode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<NatError> for RpcError {
    fn from(err: NatError) -> Self {
        Self {
            code: err.code(),
            message: err.public_message(),
        }
    }
}

pub struct RpcService {
    mappings: Arc<MappingStore>,
    manager: DaemonManager,
}

impl RpcService {
    pub fn new(mappings: Arc<MappingStore>, manager: DaemonManager) -> Self {
        Self { mappings, manager }
    }

    /// Runs `request` on behalf of `caller`; `None` means the session carries no identity.
    pub async fn dispatch(
        &self,
        caller: Option<UserId>,
        request: RpcRequest,
    ) -> Result<RpcResponse, RpcError> {
        let method: &'static str = request.name();
        let outcome: NatResult<RpcResponse> = match caller {
            Some(caller) => self.run(caller, request).await,
            None => Err(NatError::Unauthenticated),
        };

        outcome.map_err(|e| {
            match &e {
                NatError::Storage(_) | NatError::Internal(_) => error!(method, "{e}"),
                _ => debug!(method, "Rejected: {e}"),
            }
            RpcError::from(e)
        })
    }

    async fn run(&self, caller: UserId, request: RpcRequest) -> NatResult<RpcResponse> {
        let response: RpcResponse = match request {
            RpcRequest::CreateMapping(new) => RpcResponse::Mapping(self.mappings.create(caller, new).await?),
            RpcRequest::DeleteMapping { id } => {
                self.mappings.delete(caller, id).await?;
                RpcResponse::Done
            }
            RpcRequest::SetMappingOwner { id, owner } => {
                RpcResponse::Mapping(self.mappings.set_owner(caller, id, owner).await?)
            }
            RpcRequest::UpdateMapping { id, update } => {
                RpcResponse::Mapping(self.mappings.update_config(caller, id, update).await?)
            }
            RpcRequest::GetMappingInfo { id } => RpcResponse::Mapping(self.mappings.get_by_id(caller, id).await?),
            RpcRequest::GetAllMappings => RpcResponse::Mappings(self.mappings.get_all(caller).await?),
            RpcRequest::GetUsersMappings { owner } => {
                RpcResponse::Mappings(self.mappings.get_by_owner(caller, owner).await?)
            }
            RpcRequest::GetAllHosts => RpcResponse::Hosts(self.manager.get_all_hosts(caller).await?),
            RpcRequest::GetExternalAddress => {
                RpcResponse::ExternalAddress(self.manager.get_external_address(caller).await?)
            }
            RpcRequest::GetBehaviourMode => {
                RpcResponse::BehaviourMode(self.manager.get_behaviour_mode(caller).await?)
            }
            RpcRequest::SetBehaviourMode { mode, permanent } => {
                self.manager.set_behaviour_mode(caller, mode, permanent).await?;
                RpcResponse::Done
            }
        };
        Ok(response)
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
