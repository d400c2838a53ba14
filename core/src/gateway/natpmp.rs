// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! NAT-PMP cannot list a gateway's table, so this device remembers what it created.
//!
//! NAT-PMP also only ever forwards to the requesting host. Entries are recorded with the
//! private address they were requested for, so reconciliation sees the intended target.

use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;

use natwarden_common::models::gateway::RawMapping;
use natwarden_common::warn;
use natwarden_protocols::natpmp::{MapResponse, NatPmpClient};

use super::GatewayDevice;

/// Lease asked for when a permanent mapping is wanted; RFC 6886 has no permanent leases.
const PERMANENT_LEASE: u32 = 7 * 24 * 60 * 60;

pub(super) struct NatPmpGateway {
    client: NatPmpClient,
    client_ip: Ipv4Addr,
    created: Mutex<Vec<RawMapping>>,
}

impl NatPmpGateway {
    pub(super) fn new(client: NatPmpClient, client_ip: Ipv4Addr) -> Self {
        Self {
            client,
            client_ip,
            created: Mutex::new(Vec::new()),
        }
    }
}

/// The entry to remember for a granted request.
///
/// A gateway may hand out another public port than the one asked for. The entry keeps the
/// requested port so it still matches its managed mapping; only the lease comes from the grant.
fn record_grant(mapping: &RawMapping, granted: &MapResponse, now: SystemTime) -> RawMapping {
    if granted.public_port != mapping.public_port {
        warn!(
            "NAT-PMP gateway granted public port {} instead of {} for {} {}",
            granted.public_port,
            mapping.public_port,
            mapping.protocol,
            mapping.private_port
        );
    }

    RawMapping {
        expires_at: Some(now + Duration::from_secs(u64::from(granted.lifetime))),
        ..mapping.clone()
    }
}

#[async_trait]
impl GatewayDevice for NatPmpGateway {
    fn kind(&self) -> &'static str {
        "NAT-PMP"
    }

    fn internal_ip(&self) -> Ipv4Addr {
        self.client.gateway()
    }

    fn client_internal_ip(&self) -> Ipv4Addr {
        self.client_ip
    }

    async fn external_ip(&self) -> anyhow::Result<Ipv4Addr> {
        Ok(self.client.external_address().await?.address)
    }

    async fn list_mappings(&self) -> anyhow::Result<Vec<RawMapping>> {
        Ok(self.created.lock().await.clone())
    }

    async fn create_mapping(&self, mapping: &RawMapping, lifetime: Duration) -> anyhow::Result<()> {
        let requested: u32 = match lifetime.as_secs() {
            0 => PERMANENT_LEASE,
            secs => u32::try_from(secs).unwrap_or(u32::MAX),
        };

        if mapping.private_ip != self.client_ip {
            warn!(
                verbosity = 1,
                "NAT-PMP forwards to {} only, not {}",
                self.client_ip,
                mapping.private_ip
            );
        }

        let granted: MapResponse = self
            .client
            .map(mapping.protocol, mapping.private_port, mapping.public_port, requested)
            .await?;

        let recorded: RawMapping = record_grant(mapping, &granted, SystemTime::now());

        let mut created = self.created.lock().await;
        created.retain(|m| !(m.protocol == recorded.protocol && m.public_port == recorded.public_port));
        created.push(recorded);
        Ok(())
    }

    async fn delete_mapping(&self, mapping: &RawMapping) -> anyhow::Result<()> {
        self.client.unmap(mapping.protocol, mapping.private_port).await?;
        self.created
            .lock()
            .await
            .retain(|m| !(m.protocol == mapping.protocol && m.public_port == mapping.public_port));
        Ok(())
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
