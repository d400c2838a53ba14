// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Operator-facing audit trail: one `audit` log line per state change on the network.

use tokio::task::JoinHandle;

use natwarden_common::audit;
use natwarden_common::cancel::CancelToken;
use natwarden_common::events::spawn_listener;

use crate::gateway::{GatewayDiscoverer, GatewayEvent};
use crate::identity::{IdentityDirectory, IdentityEvent};
use crate::mapping::{MappingEvent, MappingStore};
use crate::network::{HostEvent, HostMapper};
use crate::watchdog::{Watchdog, WatchdogEvent};

pub fn describe_gateway(event: &GatewayEvent) -> String {
    match event {
        GatewayEvent::Found(handle) => format!(
            "{} gateway found at {}",
            handle.kind(),
            handle.internal_ip()
        ),
        GatewayEvent::Lost(handle) => format!(
            "{} gateway at {} stopped responding",
            handle.kind(),
            handle.internal_ip()
        ),
    }
}

pub fn describe_host(event: &HostEvent) -> String {
    match event {
        HostEvent::Found(host) => {
            let name: &str = host.hostname.as_deref().unwrap_or("unnamed");
            let vendor: &str = host.vendor.as_deref().unwrap_or("unknown vendor");
            format!("Host {} ({}, {name}, {vendor}) came online", host.ip, host.mac)
        }
        HostEvent::Lost(host) => format!("Host {} ({}) went offline", host.ip, host.mac),
    }
}

pub fn describe_mapping(event: &MappingEvent) -> String {
    match event {
        MappingEvent::Created { mapping, caller } => format!(
            "Mapping {} (port {}) has been created by {caller}",
            mapping.id, mapping.public_port
        ),
        MappingEvent::Updated { old, new, caller } if old.owner != new.owner => format!(
            "Mapping {} (port {}) has been handed from {} to {} by {caller}",
            new.id, new.public_port, old.owner, new.owner
        ),
        MappingEvent::Updated { new, caller, .. } => format!(
            "Mapping {} (port {}) has been updated by {caller}",
            new.id, new.public_port
        ),
        MappingEvent::Deleted {
            mapping,
            caller: Some(caller),
        } => format!(
            "Mapping {} (port {}) has been deleted by {caller}",
            mapping.id, mapping.public_port
        ),
        MappingEvent::Deleted { mapping, caller: None } => format!(
            "Mapping {} (port {}) has been deleted along with its owner {}",
            mapping.id, mapping.public_port, mapping.owner
        ),
    }
}

pub fn describe_identity(event: &IdentityEvent) -> String {
    match event {
        IdentityEvent::Created(info) => format!("User {} has been created", info.id),
        IdentityEvent::Updated(info) if !info.enabled => format!("User {} has been disabled", info.id),
        IdentityEvent::Updated(info) => format!("User {} has been updated", info.id),
        IdentityEvent::Deleted(id) => format!("User {id} has been deleted"),
    }
}

pub fn describe_watchdog(event: &WatchdogEvent) -> String {
    match event {
        WatchdogEvent::UnknownMappingFound { mapping, deleted } => {
            let outcome: &str = if *deleted { "removed" } else { "left in place" };
            format!(
                "Unknown {} mapping {} -> {}:{} ({:?}) {outcome}",
                mapping.protocol,
                mapping.public_port,
                mapping.private_ip,
                mapping.private_port,
                mapping.description
            )
        }
        WatchdogEvent::Removed { mapping, verdict } => format!(
            "Removed {} mapping on port {} ({verdict:?})",
            mapping.protocol, mapping.public_port
        ),
        WatchdogEvent::Created { mapping } => format!(
            "Forwarded {} port {} to {}:{}",
            mapping.protocol, mapping.public_port, mapping.private_ip, mapping.private_port
        ),
    }
}

/// Starts one listener per event source. All of them stop with `shutdown`.
pub fn spawn(
    gateways: &GatewayDiscoverer,
    hosts: &HostMapper,
    store: &MappingStore,
    identities: &dyn IdentityDirectory,
    watchdog: &Watchdog,
    shutdown: &CancelToken,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_listener("audit/gateway", gateways.subscribe(), shutdown.clone(), |event| async move {
            audit!("{}", describe_gateway(&event));
        }),
        spawn_listener("audit/hosts", hosts.subscribe(), shutdown.clone(), |event| async move {
            audit!(verbosity = 1, "{}", describe_host(&event));
        }),
        spawn_listener("audit/mappings", store.subscribe(), shutdown.clone(), |event| async move {
            audit!("{}", describe_mapping(&event));
        }),
        spawn_listener("audit/identities", identities.subscribe(), shutdown.clone(), |event| async move {
            audit!("{}", describe_identity(&event));
        }),
        spawn_listener("audit/watchdog", watchdog.subscribe(), shutdown.clone(), |event| async move {
            audit!("{}", describe_watchdog(&event));
        }),
    ]
}
