// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! In-process stand-ins for the gateway and the LAN, plus a harness that wires the real
//! components around them and lets a test step every loop by hand.

use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pnet::util::MacAddr;

use natwarden_common::cancel::{cancel_pair, CancelHandle, CancelToken};
use natwarden_common::config::DynamicConfig;
use natwarden_common::error::LogErrorSink;
use natwarden_common::interface::LocalInterface;
use natwarden_common::models::gateway::{DiscoveryProtocols, RawMapping};
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::models::mapping::{ManagedMapping, Protocol};
use natwarden_core::behaviour::BehaviourPolicy;
use natwarden_core::gateway::{GatewayDevice, GatewayDiscoverer, GatewayHandle, GatewayLocator};
use natwarden_core::identity::MemoryIdentityDirectory;
use natwarden_core::mapping::memory::MemoryMappingRepository;
use natwarden_core::mapping::{MappingStore, NewMapping};
use natwarden_core::network::scanner::NetworkScanner;
use natwarden_core::network::HostMapper;
use natwarden_core::watchdog::{TickReport, Watchdog};

pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
pub const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
pub const GATEWAY_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x01);
pub const LOCAL_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x02);
pub const TARGET_MAC: MacAddr = MacAddr(0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF);

const SETTLE_DEADLINE: Duration = Duration::from_secs(5);

/// Gateway whose port-forwarding table is a plain vector.
#[derive(Default)]
pub struct FakeGateway {
    table: Mutex<Vec<RawMapping>>,
    creations: AtomicUsize,
    deletions: AtomicUsize,
}

impl FakeGateway {
    pub fn table(&self) -> Vec<RawMapping> {
        self.table.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn insert(&self, raw: RawMapping) {
        if let Ok(mut table) = self.table.lock() {
            table.push(raw);
        }
    }

    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    pub fn deletions(&self) -> usize {
        self.deletions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayDevice for FakeGateway {
    fn kind(&self) -> &'static str {
        "fake"
    }

    fn internal_ip(&self) -> Ipv4Addr {
        GATEWAY_IP
    }

    fn client_internal_ip(&self) -> Ipv4Addr {
        LOCAL_IP
    }

    async fn external_ip(&self) -> anyhow::Result<Ipv4Addr> {
        Ok(Ipv4Addr::new(203, 0, 113, 7))
    }

    async fn list_mappings(&self) -> anyhow::Result<Vec<RawMapping>> {
        Ok(self.table())
    }

    async fn create_mapping(&self, mapping: &RawMapping, _lifetime: Duration) -> anyhow::Result<()> {
        let mut table = self.table.lock().map_err(|_| anyhow::anyhow!("table poisoned"))?;
        anyhow::ensure!(
            !table
                .iter()
                .any(|m| m.protocol == mapping.protocol && m.public_port == mapping.public_port),
            "conflict on port {}",
            mapping.public_port
        );
        table.push(mapping.clone());
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_mapping(&self, mapping: &RawMapping) -> anyhow::Result<()> {
        let mut table = self.table.lock().map_err(|_| anyhow::anyhow!("table poisoned"))?;
        table.retain(|m| m != mapping);
        self.deletions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the fake gateway while it is plugged in.
pub struct FakeLocator {
    gateway: Arc<FakeGateway>,
    plugged: Mutex<bool>,
}

impl FakeLocator {
    pub fn new(gateway: Arc<FakeGateway>) -> Self {
        Self {
            gateway,
            plugged: Mutex::new(true),
        }
    }

    /// While unplugged, discovery finds nothing.
    pub fn set_plugged(&self, plugged: bool) {
        if let Ok(mut state) = self.plugged.lock() {
            *state = plugged;
        }
    }
}

#[async_trait]
impl GatewayLocator for FakeLocator {
    async fn discover(&self, _: DiscoveryProtocols, _: Duration) -> Option<GatewayHandle> {
        let plugged: bool = self.plugged.lock().map(|p| *p).unwrap_or(false);
        if !plugged {
            return None;
        }
        let handle: GatewayHandle = self.gateway.clone();
        Some(handle)
    }
}

/// The LAN as a table of who answers at which address.
pub struct FakeNetwork {
    alive: Mutex<HashMap<Ipv4Addr, MacAddr>>,
    prefix: u8,
}

impl FakeNetwork {
    /// A /24 with only the gateway answering.
    pub fn new() -> Self {
        Self::with_prefix(24)
    }

    pub fn with_prefix(prefix: u8) -> Self {
        let mut alive: HashMap<Ipv4Addr, MacAddr> = HashMap::new();
        alive.insert(GATEWAY_IP, GATEWAY_MAC);
        Self {
            alive: Mutex::new(alive),
            prefix,
        }
    }

    pub fn plug(&self, ip: Ipv4Addr, mac: MacAddr) {
        if let Ok(mut alive) = self.alive.lock() {
            alive.insert(ip, mac);
        }
    }

    pub fn unplug(&self, ip: Ipv4Addr) {
        if let Ok(mut alive) = self.alive.lock() {
            alive.remove(&ip);
        }
    }

    fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.alive.lock().ok()?.get(&ip).copied()
    }
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkScanner for FakeNetwork {
    async fn host_up(&self, ip: Ipv4Addr) -> Option<Duration> {
        self.lookup(ip).map(|_| Duration::from_millis(1))
    }

    async fn resolve_mac(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.lookup(ip)
    }

    async fn hostname(&self, _: Ipv4Addr) -> Option<String> {
        None
    }

    fn interface_with_address(&self, ip: Ipv4Addr) -> Option<LocalInterface> {
        (ip == LOCAL_IP).then(|| LocalInterface {
            name: "veth0".into(),
            ip: LOCAL_IP,
            prefix: self.prefix,
            mac: LOCAL_MAC,
        })
    }
}

/// The real components around the fakes, with every loop stepped by hand.
pub struct Harness {
    pub config: DynamicConfig,
    pub gateway: Arc<FakeGateway>,
    pub locator: Arc<FakeLocator>,
    pub network: Arc<FakeNetwork>,
    pub identities: Arc<MemoryIdentityDirectory>,
    pub discoverer: Arc<GatewayDiscoverer>,
    pub hosts: Arc<HostMapper>,
    pub store: Arc<MappingStore>,
    pub policy: Arc<BehaviourPolicy>,
    pub watchdog: Arc<Watchdog>,
    pub admin: UserId,
    shutdown: CancelHandle,
}

impl Harness {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_network(FakeNetwork::new()).await
    }

    pub async fn with_network(network: FakeNetwork) -> anyhow::Result<Self> {
        let config: DynamicConfig = DynamicConfig::in_memory();
        let gateway: Arc<FakeGateway> = Arc::new(FakeGateway::default());
        let locator: Arc<FakeLocator> = Arc::new(FakeLocator::new(gateway.clone()));
        let network: Arc<FakeNetwork> = Arc::new(network);
        let identities: Arc<MemoryIdentityDirectory> = Arc::new(MemoryIdentityDirectory::new());

        let admin: UserId = UserId::new_random();
        identities.add(UserInfo::new(admin, Permissions::ADMINISTRATOR)).await?;

        let discoverer: Arc<GatewayDiscoverer> = Arc::new(GatewayDiscoverer::new(
            locator.clone(),
            network.clone(),
            config.clone(),
            DiscoveryProtocols::ALL,
            Arc::new(LogErrorSink),
        ));
        let hosts: Arc<HostMapper> = Arc::new(HostMapper::new(
            network.clone(),
            discoverer.clone(),
            config.clone(),
            Arc::new(LogErrorSink),
        ));
        let store: Arc<MappingStore> = Arc::new(MappingStore::new(
            Arc::new(MemoryMappingRepository::new()),
            identities.clone(),
        ));
        let policy: Arc<BehaviourPolicy> = Arc::new(BehaviourPolicy::load(config.clone())?);
        let watchdog: Arc<Watchdog> = Arc::new(Watchdog::new(
            config.clone(),
            policy.clone(),
            Arc::new(LogErrorSink),
        ));

        let (shutdown, token): (CancelHandle, CancelToken) = cancel_pair();
        store.spawn_orphan_listener(&token, Arc::new(LogErrorSink));
        watchdog.attach(&discoverer, &hosts, &store, &token).await?;

        let harness: Self = Self {
            config,
            gateway,
            locator,
            network,
            identities,
            discoverer,
            hosts,
            store,
            policy,
            watchdog,
            admin,
            shutdown,
        };
        harness.heartbeat().await?;
        Ok(harness)
    }

    /// One gateway heartbeat. Gateway changes reach the host mapper before this returns, the
    /// way the mapper's own listener would deliver them in the daemon.
    pub async fn heartbeat(&self) -> anyhow::Result<()> {
        let mut changes = self.discoverer.subscribe();
        self.discoverer.heartbeat().await?;
        while let Ok(change) = changes.try_recv() {
            self.hosts.on_gateway_changed(change).await;
        }
        self.settle().await
    }

    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let found: usize = self.hosts.discover(&CancelToken::never()).await?;
        self.settle().await?;
        Ok(found)
    }

    pub async fn liveness(&self) -> anyhow::Result<usize> {
        let lost: usize = self.hosts.check_liveness(&CancelToken::never()).await?;
        self.settle().await?;
        Ok(lost)
    }

    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        self.settle().await?;
        self.watchdog.tick().await
    }

    /// Waits until every listener has caught up: the watchdog's caches mirror their sources
    /// and a lost gateway has taken the host set with it.
    pub async fn settle(&self) -> anyhow::Result<()> {
        let caught_up: bool = eventually(SETTLE_DEADLINE, || self.in_sync()).await;
        anyhow::ensure!(caught_up, "listeners did not catch up within {SETTLE_DEADLINE:?}");
        Ok(())
    }

    async fn in_sync(&self) -> bool {
        let tracked: bool = self.discoverer.current_handle().await.is_some();
        let mut alive: Vec<MacAddr> = self.hosts.all_hosts().await.iter().map(|h| h.mac).collect();
        if !tracked && !alive.is_empty() {
            return false;
        }
        if self.watchdog.has_device().await != tracked {
            return false;
        }

        let mut cached: Vec<MacAddr> = self.watchdog.known_hosts().await.iter().map(|h| h.mac).collect();
        alive.sort();
        cached.sort();
        if alive != cached {
            return false;
        }

        let Ok(mut stored) = self.store.snapshot().await else {
            return false;
        };
        let mut mirrored: Vec<ManagedMapping> = self.watchdog.known_mappings().await;
        stored.sort_by_key(|m| m.id);
        mirrored.sort_by_key(|m| m.id);
        stored == mirrored
    }

    /// The usual mapping: TCP 8080 -> public 9000 on [`TARGET_MAC`], owned by the admin.
    pub async fn forward(&self, public_port: u16) -> anyhow::Result<ManagedMapping> {
        let created: ManagedMapping = self
            .store
            .create(self.admin, forward_request(self.admin, public_port))
            .await?;
        self.settle().await?;
        Ok(created)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn forward_request(owner: UserId, public_port: u16) -> NewMapping {
    NewMapping {
        owner,
        protocol: Protocol::Tcp,
        private_port: 8080,
        public_port,
        mac: vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        description: Some("web".into()),
        enabled: true,
    }
}

/// Polls `check` until it holds or `deadline` passes.
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let stop = tokio::time::Instant::now() + deadline;
    while tokio::time::Instant::now() < stop {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
