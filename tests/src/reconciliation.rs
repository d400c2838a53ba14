// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

#![cfg(test)]
use std::net::Ipv4Addr;
use std::time::Duration;

use pnet::util::MacAddr;

use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::models::gateway::RawMapping;
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::models::mapping::{ManagedMapping, Protocol};
use natwarden_core::mapping::{MappingEvent, NewMapping};
use natwarden_core::watchdog::{TickReport, WatchdogEvent};

use crate::support::{
    eventually, forward_request, FakeNetwork, Harness, GATEWAY_IP, GATEWAY_MAC, TARGET_MAC,
};

const TARGET_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);
const OTHER_MAC: MacAddr = MacAddr(0x02, 0x11, 0x22, 0x33, 0x44, 0x55);

async fn converged() -> (Harness, ManagedMapping) {
    let h: Harness = Harness::new().await.unwrap();
    h.network.plug(TARGET_IP, TARGET_MAC);
    h.sweep().await.unwrap();
    let mapping: ManagedMapping = h.forward(9000).await.unwrap();
    let report: TickReport = h.tick().await.unwrap();
    assert_eq!(report.created.len(), 1, "setup did not converge: {report:?}");
    (h, mapping)
}

#[tokio::test]
async fn single_tick_creates_exactly_one_forward() {
    let h: Harness = Harness::new().await.unwrap();
    h.network.plug(TARGET_IP, TARGET_MAC);
    h.sweep().await.unwrap();
    let mapping: ManagedMapping = h.forward(9000).await.unwrap();

    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.created.len(), 1);
    assert!(report.deleted.is_empty());
    assert_eq!(
        h.gateway.table(),
        vec![RawMapping::permanent(
            Protocol::Tcp,
            TARGET_IP,
            8080,
            9000,
            mapping.id.to_string()
        )]
    );
}

#[tokio::test]
async fn created_entry_reads_back_to_its_mapping() {
    let (h, mapping) = converged().await;

    let table: Vec<RawMapping> = h.gateway.table();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].correlation_id(), Some(mapping.id));
    assert!(table[0].matches(&mapping));
}

#[tokio::test]
async fn second_tick_changes_nothing() {
    let (h, _) = converged().await;

    let again: TickReport = h.tick().await.unwrap();

    assert!(again.is_quiet(), "unexpected work: {again:?}");
    assert_eq!(h.gateway.creations(), 1);
    assert_eq!(h.gateway.deletions(), 0);
}

#[tokio::test]
async fn address_taken_over_by_another_device() {
    let (h, _) = converged().await;

    h.network.plug(TARGET_IP, OTHER_MAC);
    assert_eq!(h.liveness().await.unwrap(), 1);
    h.sweep().await.unwrap();

    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.deleted.len(), 1);
    assert!(report.created.is_empty());
    assert!(h.gateway.table().is_empty());
}

#[tokio::test]
async fn forward_follows_the_device_to_its_new_address() {
    let (h, _) = converged().await;
    let moved: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 60);

    h.network.unplug(TARGET_IP);
    h.network.plug(moved, TARGET_MAC);
    h.liveness().await.unwrap();
    h.sweep().await.unwrap();

    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.created.len(), 1);
    assert_eq!(h.gateway.table()[0].private_ip, moved);
}

#[tokio::test]
async fn unmanaged_entries_survive_only_in_permissive_mode() {
    let h: Harness = Harness::new().await.unwrap();
    let foreign: RawMapping =
        RawMapping::permanent(Protocol::Udp, Ipv4Addr::new(192, 168, 1, 9), 3074, 3074, "console");
    h.gateway.insert(foreign.clone());
    let mut events = h.watchdog.subscribe();

    h.policy.set(BehaviourMode::Permissive, false).await.unwrap();
    let permissive: TickReport = h.tick().await.unwrap();
    assert!(permissive.deleted.is_empty());
    assert_eq!(h.gateway.table(), vec![foreign.clone()]);
    assert_eq!(
        events.try_recv().unwrap(),
        WatchdogEvent::UnknownMappingFound {
            mapping: foreign.clone(),
            deleted: false
        }
    );

    h.policy.set(BehaviourMode::Enforcing, false).await.unwrap();
    let enforcing: TickReport = h.tick().await.unwrap();
    assert_eq!(enforcing.deleted, vec![foreign.clone()]);
    assert!(h.gateway.table().is_empty());
    assert_eq!(
        events.try_recv().unwrap(),
        WatchdogEvent::UnknownMappingFound {
            mapping: foreign,
            deleted: true
        }
    );
}

#[tokio::test]
async fn disabling_withdraws_the_forward() {
    let (h, mapping) = converged().await;

    h.store.set_enabled(h.admin, mapping.id, false).await.unwrap();
    let report: TickReport = h.tick().await.unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert!(report.created.is_empty());

    assert!(h.tick().await.unwrap().is_quiet());
}

#[tokio::test]
async fn port_change_replaces_the_entry() {
    let (h, mapping) = converged().await;

    h.store.set_public_port(h.admin, mapping.id, 9443).await.unwrap();
    h.settle().await.unwrap();
    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.created.len(), 1);
    assert_eq!(h.gateway.table()[0].public_port, 9443);
    assert_eq!(h.gateway.table()[0].correlation_id(), Some(mapping.id));
}

#[tokio::test]
async fn new_mac_moves_the_forward_to_that_device() {
    let (h, mapping) = converged().await;
    let other_ip: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 60);
    h.network.plug(other_ip, OTHER_MAC);
    h.sweep().await.unwrap();

    let mut events = h.store.subscribe();
    let moved: ManagedMapping = h
        .store
        .set_mac(h.admin, mapping.id, vec![0x02, 0x11, 0x22, 0x33, 0x44, 0x55])
        .await
        .unwrap();
    assert_eq!(moved.mac, OTHER_MAC);
    assert!(matches!(events.try_recv().unwrap(), MappingEvent::Updated { .. }));

    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.deleted[0].private_ip, TARGET_IP);
    assert_eq!(report.created.len(), 1);
    let table: Vec<RawMapping> = h.gateway.table();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].private_ip, other_ip);
    assert_eq!(table[0].correlation_id(), Some(mapping.id));
    assert!(h.tick().await.unwrap().is_quiet());
}

#[tokio::test]
async fn private_port_change_replaces_the_entry() {
    let (h, mapping) = converged().await;

    h.store.set_private_port(h.admin, mapping.id, 8443).await.unwrap();
    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.created.len(), 1);
    assert_eq!(h.gateway.table()[0].private_port, 8443);
    assert_eq!(h.gateway.table()[0].public_port, 9000);
}

#[tokio::test]
async fn deleting_an_identity_removes_its_mappings_and_forwards() {
    let h: Harness = Harness::new().await.unwrap();
    let bob: UserId = UserId::new_random();
    h.identities
        .add(UserInfo::new(bob, Permissions::STANDARD))
        .await
        .unwrap();
    h.network.plug(TARGET_IP, TARGET_MAC);
    h.sweep().await.unwrap();

    for port in [9000, 9001] {
        h.store.create(bob, forward_request(bob, port)).await.unwrap();
    }
    assert_eq!(h.tick().await.unwrap().created.len(), 2);

    let mut events = h.store.subscribe();
    h.identities.delete(bob).await.unwrap();
    let store = h.store.clone();
    let emptied: bool = eventually(Duration::from_secs(5), || {
        let store = store.clone();
        async move { store.snapshot().await.map(|all| all.is_empty()).unwrap_or(false) }
    })
    .await;
    assert!(emptied, "orphan cleanup did not run");
    h.settle().await.unwrap();

    let mut cascaded: usize = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            MappingEvent::Deleted { caller: None, mapping } if mapping.owner == bob => cascaded += 1,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(cascaded, 2);
    assert!(h.store.snapshot().await.unwrap().is_empty());

    let report: TickReport = h.tick().await.unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert!(h.gateway.table().is_empty());
}

#[tokio::test]
async fn losing_the_gateway_pauses_reconciliation() {
    let (h, _) = converged().await;

    h.locator.set_plugged(false);
    h.network.unplug(GATEWAY_IP);
    h.heartbeat().await.unwrap();

    assert!(h.discoverer.current_handle().await.is_none());
    assert!(h.hosts.all_hosts().await.is_empty());
    assert!(h.tick().await.unwrap().is_quiet());

    h.network.plug(GATEWAY_IP, GATEWAY_MAC);
    h.locator.set_plugged(true);
    h.heartbeat().await.unwrap();
    h.sweep().await.unwrap();

    assert!(h.tick().await.unwrap().is_quiet());
    assert_eq!(h.gateway.table().len(), 1);
    assert_eq!(h.gateway.creations(), 1);
}

#[tokio::test]
async fn crowded_subnet_gets_every_forward() {
    let h: Harness = Harness::with_network(FakeNetwork::with_prefix(23)).await.unwrap();
    let devices: Vec<(Ipv4Addr, MacAddr)> = (0u16..300)
        .map(|i| {
            let ip: Ipv4Addr = if i < 200 {
                Ipv4Addr::new(192, 168, 0, 10 + i as u8)
            } else {
                Ipv4Addr::new(192, 168, 1, 10 + (i - 200) as u8)
            };
            (ip, MacAddr(0x02, 0xAB, 0, 0, (i >> 8) as u8, i as u8))
        })
        .collect();

    for (offset, (_, mac)) in devices.iter().enumerate() {
        let request: NewMapping = NewMapping {
            mac: vec![mac.0, mac.1, mac.2, mac.3, mac.4, mac.5],
            ..forward_request(h.admin, 10_000 + offset as u16)
        };
        h.store.create(h.admin, request).await.unwrap();
    }
    for (ip, mac) in &devices {
        h.network.plug(*ip, *mac);
    }

    assert!(h.sweep().await.unwrap() >= devices.len());
    let report: TickReport = h.tick().await.unwrap();

    assert_eq!(report.created.len(), devices.len());
    assert_eq!(h.gateway.table().len(), devices.len());
}
