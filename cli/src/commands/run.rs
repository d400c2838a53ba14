// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Starts the daemon against the real network and waits for Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use natwarden_common::config::DynamicConfig;
use natwarden_common::config::file::FileConfigStore;
use natwarden_common::error::LogErrorSink;
use natwarden_common::models::gateway::DiscoveryProtocols;
use natwarden_common::{info, success, warn};
use natwarden_core::daemon::{Daemon, DaemonParts};
use natwarden_core::gateway::locator::SystemLocator;
use natwarden_core::identity::MemoryIdentityDirectory;
use natwarden_core::mapping::memory::MemoryMappingRepository;
use natwarden_core::network::scanner::SystemScanner;

use crate::settings::LaunchSettings;

pub async fn run(settings_path: &Path) -> anyhow::Result<()> {
    let settings: LaunchSettings = LaunchSettings::load(settings_path)?;
    let protocols: DiscoveryProtocols = settings.discovery_protocols()?;

    let config: DynamicConfig = match &settings.config_store {
        Some(path) => {
            let store: FileConfigStore = FileConfigStore::open(path)?;
            info!("Runtime configuration persisted to {}", store.path().display());
            DynamicConfig::new(Arc::new(store))
        }
        None => DynamicConfig::in_memory(),
    };

    let identities: Arc<MemoryIdentityDirectory> = Arc::new(MemoryIdentityDirectory::new());
    for user in &settings.users {
        identities
            .add(user.to_info())
            .await
            .with_context(|| format!("seeding user {}", user.id))?;
    }

    let daemon: Daemon = Daemon::start(DaemonParts {
        config,
        locator: Arc::new(SystemLocator),
        scanner: Arc::new(SystemScanner::new()),
        repository: Arc::new(MemoryMappingRepository::new()),
        identities,
        protocols,
        errors: Arc::new(LogErrorSink),
    })
    .await?;

    for seed in &settings.mappings {
        let request = match seed.to_request() {
            Ok(request) => request,
            Err(e) => {
                warn!("Skipping mapping for port {}: {e:#}", seed.public_port);
                continue;
            }
        };
        if let Err(e) = daemon.mappings().create(seed.owner, request).await {
            warn!("Skipping mapping for port {}: {e}", seed.public_port);
        }
    }

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");
    daemon.shutdown().await;
    success!("Stopped");
    Ok(())
}
