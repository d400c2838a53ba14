// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use natwarden_common::models::gateway::RawMapping;
use natwarden_protocols::upnp::{IgdClient, PortMappingEntry};

use super::GatewayDevice;

pub(super) struct UpnpGateway {
    client: IgdClient,
    internal_ip: Ipv4Addr,
    client_ip: Ipv4Addr,
}

impl UpnpGateway {
    pub(super) fn new(client: IgdClient, internal_ip: Ipv4Addr, client_ip: Ipv4Addr) -> Self {
        Self {
            client,
            internal_ip,
            client_ip,
        }
    }
}

fn to_raw(entry: PortMappingEntry, now: SystemTime) -> RawMapping {
    RawMapping {
        protocol: entry.protocol,
        private_ip: entry.internal_client,
        private_port: entry.internal_port,
        public_port: entry.external_port,
        description: entry.description,
        expires_at: (entry.lease_duration > 0)
            .then(|| now + Duration::from_secs(u64::from(entry.lease_duration))),
    }
}

#[async_trait]
impl GatewayDevice for UpnpGateway {
    fn kind(&self) -> &'static str {
        "UPnP"
    }

    fn internal_ip(&self) -> Ipv4Addr {
        self.internal_ip
    }

    fn client_internal_ip(&self) -> Ipv4Addr {
        self.client_ip
    }

    async fn external_ip(&self) -> anyhow::Result<Ipv4Addr> {
        self.client.external_ip().await
    }

    async fn list_mappings(&self) -> anyhow::Result<Vec<RawMapping>> {
        let now: SystemTime = SystemTime::now();
        let entries: Vec<PortMappingEntry> = self.client.port_mappings().await?;
        Ok(entries.into_iter().map(|entry| to_raw(entry, now)).collect())
    }

    async fn create_mapping(&self, mapping: &RawMapping, lifetime: Duration) -> anyhow::Result<()> {
        let entry: PortMappingEntry = PortMappingEntry {
            protocol: mapping.protocol,
            external_port: mapping.public_port,
            internal_client: mapping.private_ip,
            internal_port: mapping.private_port,
            description: mapping.description.clone(),
            lease_duration: u32::try_from(lifetime.as_secs()).unwrap_or(u32::MAX),
            enabled: true,
        };
        self.client.add_port_mapping(&entry).await
    }

    async fn delete_mapping(&self, mapping: &RawMapping) -> anyhow::Result<()> {
        self.client
            .delete_port_mapping(mapping.protocol, mapping.public_port)
            .await
    }
}
