// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

#![cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use natwarden_common::config::{keys, DynamicConfig};
use natwarden_common::error::LogErrorSink;
use natwarden_common::models::gateway::DiscoveryProtocols;
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::models::mapping::ManagedMapping;
use natwarden_core::daemon::{Daemon, DaemonParts};
use natwarden_core::identity::MemoryIdentityDirectory;
use natwarden_core::mapping::memory::MemoryMappingRepository;
use natwarden_core::rpc::{RpcRequest, RpcResponse, RpcService};

use crate::support::{eventually, forward_request, FakeGateway, FakeLocator, FakeNetwork, TARGET_MAC};

fn fast_config() -> DynamicConfig {
    let config: DynamicConfig = DynamicConfig::in_memory();
    for key in [
        keys::GATEWAY_HEARTBEAT_FREQUENCY,
        keys::NETWORK_DISCOVERY_FREQUENCY,
        keys::NETWORK_HEARTBEAT_FREQUENCY,
        keys::WATCHDOG_UPDATE_FREQUENCY,
    ] {
        config.set(key.name, &25u64).unwrap();
    }
    config
}

#[tokio::test]
async fn running_daemon_converges_on_its_own() {
    let gateway: Arc<FakeGateway> = Arc::new(FakeGateway::default());
    let network: Arc<FakeNetwork> = Arc::new(FakeNetwork::new());
    network.plug(Ipv4Addr::new(192, 168, 1, 50), TARGET_MAC);

    let identities: Arc<MemoryIdentityDirectory> = Arc::new(MemoryIdentityDirectory::new());
    let admin: UserId = UserId::new_random();
    identities
        .add(UserInfo::new(admin, Permissions::ADMINISTRATOR))
        .await
        .unwrap();

    let daemon: Daemon = Daemon::start(DaemonParts {
        config: fast_config(),
        locator: Arc::new(FakeLocator::new(gateway.clone())),
        scanner: network.clone(),
        repository: Arc::new(MemoryMappingRepository::new()),
        identities,
        protocols: DiscoveryProtocols::ALL,
        errors: Arc::new(LogErrorSink),
    })
    .await
    .unwrap();

    let rpc: RpcService = RpcService::new(daemon.mappings().clone(), daemon.manager());
    let Ok(RpcResponse::Mapping(mapping)) = rpc
        .dispatch(Some(admin), RpcRequest::CreateMapping(forward_request(admin, 9000)))
        .await
    else {
        panic!("mapping was not created");
    };

    let forwarded: bool = eventually(Duration::from_secs(5), || {
        let table = gateway.table();
        let id = mapping.id;
        async move { table.len() == 1 && table[0].correlation_id() == Some(id) }
    })
    .await;
    assert!(forwarded, "gateway table never converged: {:?}", gateway.table());

    let Ok(RpcResponse::Hosts(hosts)) = rpc.dispatch(Some(admin), RpcRequest::GetAllHosts).await else {
        panic!("hosts unavailable");
    };
    assert!(hosts.iter().any(|host| host.mac == TARGET_MAC));

    let external = rpc.dispatch(Some(admin), RpcRequest::GetExternalAddress).await;
    assert_eq!(external, Ok(RpcResponse::ExternalAddress(Some(Ipv4Addr::new(203, 0, 113, 7)))));

    rpc.dispatch(Some(admin), RpcRequest::DeleteMapping { id: mapping.id })
        .await
        .unwrap();
    let withdrawn: bool = eventually(Duration::from_secs(5), || {
        let empty: bool = gateway.table().is_empty();
        async move { empty }
    })
    .await;
    assert!(withdrawn);

    daemon.shutdown().await;
}

#[tokio::test]
async fn orphans_are_removed_at_start() {
    use natwarden_core::mapping::MappingRepository;

    let repository: Arc<MemoryMappingRepository> = Arc::new(MemoryMappingRepository::new());
    let ghost: UserId = UserId::new_random();
    let orphan: ManagedMapping = ManagedMapping {
        id: natwarden_common::models::mapping::MappingId::new_random(),
        owner: ghost,
        protocol: natwarden_common::models::mapping::Protocol::Tcp,
        private_port: 22,
        public_port: 2222,
        mac: TARGET_MAC,
        description: String::new(),
        enabled: true,
        created_at: 0,
        created_by: ghost,
    };
    repository.insert(&orphan).await.unwrap();

    let gateway: Arc<FakeGateway> = Arc::new(FakeGateway::default());
    let daemon: Daemon = Daemon::start(DaemonParts {
        config: DynamicConfig::in_memory(),
        locator: Arc::new(FakeLocator::new(gateway)),
        scanner: Arc::new(FakeNetwork::new()),
        repository: repository.clone(),
        identities: Arc::new(MemoryIdentityDirectory::new()),
        protocols: DiscoveryProtocols::ALL,
        errors: Arc::new(LogErrorSink),
    })
    .await
    .unwrap();

    assert!(repository.get_all().await.unwrap().is_empty());
    daemon.shutdown().await;
}
