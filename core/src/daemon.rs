// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Daemon wiring.
//!
//! Components are built in dependency order and handed their collaborators directly:
//! configuration and policy first, then gateway discovery, host mapping, the mapping store,
//! the watchdog and finally the audit log. [`Daemon::shutdown`] flips one cancellation flag that
//! every loop and listener observes.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use natwarden_common::cancel::{CancelHandle, CancelToken, cancel_pair};
use natwarden_common::config::DynamicConfig;
use natwarden_common::error::{NatError, NatResult, SharedErrorSink};
use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::models::gateway::DiscoveryProtocols;
use natwarden_common::models::host::NetworkHost;
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::{debug, info, success, warn};

use crate::audit;
use crate::behaviour::BehaviourPolicy;
use crate::gateway::{GatewayDiscoverer, GatewayLocator};
use crate::identity::IdentityDirectory;
use crate::mapping::{MappingRepository, MappingStore};
use crate::network::HostMapper;
use crate::network::scanner::NetworkScanner;
use crate::watchdog::Watchdog;

/// Everything the daemon needs from the outside world.
pub struct DaemonParts {
    pub config: DynamicConfig,
    pub locator: Arc<dyn GatewayLocator>,
    pub scanner: Arc<dyn NetworkScanner>,
    pub repository: Arc<dyn MappingRepository>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub protocols: DiscoveryProtocols,
    pub errors: SharedErrorSink,
}

pub struct Daemon {
    policy: Arc<BehaviourPolicy>,
    gateways: Arc<GatewayDiscoverer>,
    hosts: Arc<HostMapper>,
    mappings: Arc<MappingStore>,
    watchdog: Arc<Watchdog>,
    identities: Arc<dyn IdentityDirectory>,
    shutdown: CancelHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Builds every component and starts their loops.
    pub async fn start(parts: DaemonParts) -> anyhow::Result<Self> {
        let DaemonParts {
            config,
            locator,
            scanner,
            repository,
            identities,
            protocols,
            errors,
        } = parts;
        let (shutdown, token): (CancelHandle, CancelToken) = cancel_pair();

        let policy: Arc<BehaviourPolicy> = Arc::new(BehaviourPolicy::load(config.clone())?);
        let gateways: Arc<GatewayDiscoverer> = Arc::new(GatewayDiscoverer::new(
            locator,
            scanner.clone(),
            config.clone(),
            protocols,
            errors.clone(),
        ));
        let hosts: Arc<HostMapper> = Arc::new(HostMapper::new(
            scanner,
            gateways.clone(),
            config.clone(),
            errors.clone(),
        ));
        let mappings: Arc<MappingStore> = Arc::new(MappingStore::new(repository, identities.clone()));
        let watchdog: Arc<Watchdog> = Arc::new(Watchdog::new(config, policy.clone(), errors.clone()));

        let orphans: usize = mappings.clean_orphans().await?;
        if orphans > 0 {
            info!("Removed {orphans} mappings whose owners no longer exist");
        }

        let mut tasks: Vec<JoinHandle<()>> = audit::spawn(
            &gateways,
            &hosts,
            &mappings,
            identities.as_ref(),
            &watchdog,
            &token,
        );
        tasks.push(mappings.spawn_orphan_listener(&token, errors));
        tasks.extend(watchdog.attach(&gateways, &hosts, &mappings, &token).await?);

        tasks.push(gateways.spawn(&token));
        tasks.extend(hosts.spawn(&token));
        tasks.push(watchdog.spawn(&token));

        success!("Daemon started, looking for {} gateways", gateways.protocols());
        Ok(Self {
            policy,
            gateways,
            hosts,
            mappings,
            watchdog,
            identities,
            shutdown,
            tasks,
        })
    }

    pub fn gateways(&self) -> &Arc<GatewayDiscoverer> {
        &self.gateways
    }

    pub fn hosts(&self) -> &Arc<HostMapper> {
        &self.hosts
    }

    pub fn mappings(&self) -> &Arc<MappingStore> {
        &self.mappings
    }

    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    pub fn manager(&self) -> DaemonManager {
        DaemonManager::new(
            self.policy.clone(),
            self.gateways.clone(),
            self.hosts.clone(),
            self.identities.clone(),
        )
    }

    /// Cancels every loop and waits for them to wind down.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Task ended abnormally: {e}"),
            }
        }
        debug!("All daemon tasks stopped");
    }
}

/// Looks up `caller` and checks it holds `permission`.
pub(crate) async fn authorize(
    identities: &dyn IdentityDirectory,
    caller: UserId,
    permission: Permissions,
) -> NatResult<UserInfo> {
    let info: UserInfo = identities.get_user_info(caller).await?;
    if !info.can(permission) {
        return Err(NatError::Unauthorized);
    }
    Ok(info)
}

/// Daemon-level operations exposed to remote callers.
#[derive(Clone)]
pub struct DaemonManager {
    policy: Arc<BehaviourPolicy>,
    gateways: Arc<GatewayDiscoverer>,
    hosts: Arc<HostMapper>,
    identities: Arc<dyn IdentityDirectory>,
}

impl DaemonManager {
    pub fn new(
        policy: Arc<BehaviourPolicy>,
        gateways: Arc<GatewayDiscoverer>,
        hosts: Arc<HostMapper>,
        identities: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            policy,
            gateways,
            hosts,
            identities,
        }
    }

    pub async fn get_behaviour_mode(&self, caller: UserId) -> NatResult<BehaviourMode> {
        authorize(self.identities.as_ref(), caller, Permissions::MANAGE_DAEMON).await?;
        Ok(self.policy.mode().await)
    }

    /// `permanent` writes the mode to configuration; otherwise it lasts until restart.
    pub async fn set_behaviour_mode(
        &self,
        caller: UserId,
        mode: BehaviourMode,
        permanent: bool,
    ) -> NatResult<()> {
        authorize(self.identities.as_ref(), caller, Permissions::MANAGE_DAEMON).await?;
        self.policy.set(mode, permanent).await?;
        info!("Behaviour mode set to {mode} by {caller}");
        Ok(())
    }

    pub async fn get_all_hosts(&self, caller: UserId) -> NatResult<Vec<NetworkHost>> {
        authorize(self.identities.as_ref(), caller, Permissions::MANAGE_NETWORK).await?;
        Ok(self.hosts.all_hosts().await)
    }

    /// The tracked gateway's public address, or `None` while no gateway is tracked.
    pub async fn get_external_address(&self, caller: UserId) -> NatResult<Option<Ipv4Addr>> {
        authorize(self.identities.as_ref(), caller, Permissions::MANAGE_NETWORK).await?;
        let Some(gateway) = self.gateways.current_handle().await else {
            return Ok(None);
        };
        Ok(Some(gateway.external_ip().await?))
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
