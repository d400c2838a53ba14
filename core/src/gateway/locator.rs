// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Finds the LAN's gateway over UPnP (SSDP + IGD description) and NAT-PMP (default route).
//!
//! UPnP is tried first because it can enumerate the device's table; NAT-PMP is the fallback.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use natwarden_common::debug;
use natwarden_common::interface::{self, LocalInterface};
use natwarden_common::models::gateway::DiscoveryProtocols;
use natwarden_protocols::natpmp::NatPmpClient;
use natwarden_protocols::route::{self, DefaultRoute};
use natwarden_protocols::ssdp;
use natwarden_protocols::upnp::IgdClient;

use super::natpmp::NatPmpGateway;
use super::upnp::UpnpGateway;
use super::{GatewayHandle, GatewayLocator};

const MIN_STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLocator;

#[async_trait]
impl GatewayLocator for SystemLocator {
    async fn discover(
        &self,
        protocols: DiscoveryProtocols,
        timeout: Duration,
    ) -> Option<GatewayHandle> {
        // Each protocol gets a slice of the budget so both fit inside `timeout`.
        let step: Duration = (timeout / 3).max(MIN_STEP);

        if protocols.contains(DiscoveryProtocols::UPNP) {
            match discover_upnp(step).await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => debug!(verbosity = 1, "No UPnP gateway answered"),
                Err(e) => debug!(verbosity = 1, "UPnP discovery failed: {e:#}"),
            }
        }

        if protocols.contains(DiscoveryProtocols::PMP) {
            match discover_natpmp(step).await {
                Ok(Some(found)) => return Some(found),
                Ok(None) => debug!(verbosity = 1, "No NAT-PMP gateway answered"),
                Err(e) => debug!(verbosity = 1, "NAT-PMP discovery failed: {e:#}"),
            }
        }

        None
    }
}

fn client_ip_facing(gateway: Ipv4Addr) -> Option<Ipv4Addr> {
    let local: Option<LocalInterface> = interface::interface_facing(gateway);
    if local.is_none() {
        debug!(verbosity = 1, "No local interface faces gateway {gateway}");
    }
    local.map(|intf| intf.ip)
}

async fn discover_upnp(step: Duration) -> anyhow::Result<Option<GatewayHandle>> {
    for location in ssdp::search(step).await? {
        let client: IgdClient = match IgdClient::from_location(&location, step).await {
            Ok(client) => client,
            Err(e) => {
                debug!(verbosity = 1, "Ignoring device at {location}: {e:#}");
                continue;
            }
        };

        let Some(gateway_ip) = client.gateway_address() else {
            debug!(verbosity = 1, "Control URL of {location} is not an IPv4 address");
            continue;
        };
        let Some(client_ip) = client_ip_facing(gateway_ip) else {
            continue;
        };

        return Ok(Some(Arc::new(UpnpGateway::new(client, gateway_ip, client_ip))));
    }
    Ok(None)
}

async fn discover_natpmp(step: Duration) -> anyhow::Result<Option<GatewayHandle>> {
    let Some(default_route) = route::default_route().await? else {
        return Ok(None);
    };
    let DefaultRoute { gateway, .. } = default_route;

    let client: NatPmpClient = NatPmpClient::new(gateway, step);
    let external = client.external_address().await?;
    debug!(verbosity = 1, "NAT-PMP gateway {gateway} reports external address {}", external.address);

    Ok(client_ip_facing(gateway)
        .map(|client_ip| Arc::new(NatPmpGateway::new(client, client_ip)) as GatewayHandle))
}
