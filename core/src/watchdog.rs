// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Reconciliation Watchdog
//!
//! The only component that writes to the gateway. Each tick compares three views:
//! the managed mappings, the alive hosts and the gateway's own table, then converges the
//! table toward what is wanted.
//!
//! ## Tick
//! 1. **Removal**: every raw entry is classified by [`reconcile::classify`]; anything that is
//!    not [`Verdict::Keep`] is deleted, except unmanaged entries in permissive mode.
//! 2. **Creation**: every enabled mapping whose target MAC is alive and which has no
//!    matching entry left gets one, pointing at the host's current address.
//!
//! ## Caches
//! The three views are local copies behind separate locks, seeded from snapshots and kept
//! current by event listeners. The device lock is held for a whole tick; the other two are
//! only held long enough to copy them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pnet::util::MacAddr;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use natwarden_common::cancel::CancelToken;
use natwarden_common::config::{DynamicConfig, keys};
use natwarden_common::error::{NatResult, SharedErrorSink};
use natwarden_common::events::{Publisher, spawn_mirroring_listener};
use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::models::gateway::RawMapping;
use natwarden_common::models::host::NetworkHost;
use natwarden_common::models::mapping::{ManagedMapping, MappingId};
use natwarden_common::{debug, success};

use crate::behaviour::BehaviourPolicy;
use crate::gateway::{GatewayDiscoverer, GatewayEvent, GatewayHandle};
use crate::mapping::{MappingEvent, MappingStore};
use crate::network::{HostEvent, HostMapper};

pub mod reconcile;

use reconcile::Verdict;

const FALLBACK_PERIOD: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// A raw entry without a managed id was seen; `deleted` tells whether it was removed.
    UnknownMappingFound { mapping: RawMapping, deleted: bool },
    Removed { mapping: RawMapping, verdict: Verdict },
    Created { mapping: RawMapping },
}

/// What one tick changed on the device.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub deleted: Vec<RawMapping>,
    pub created: Vec<RawMapping>,
    pub failures: usize,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty() && self.failures == 0
    }
}

pub struct Watchdog {
    config: DynamicConfig,
    policy: Arc<BehaviourPolicy>,
    mappings: Mutex<HashMap<MappingId, ManagedMapping>>,
    hosts: Mutex<Vec<NetworkHost>>,
    device: Mutex<Option<GatewayHandle>>,
    events: Publisher<WatchdogEvent>,
    errors: SharedErrorSink,
}

impl Watchdog {
    pub fn new(
        config: DynamicConfig,
        policy: Arc<BehaviourPolicy>,
        errors: SharedErrorSink,
    ) -> Self {
        Self {
            config,
            policy,
            mappings: Mutex::new(HashMap::new()),
            hosts: Mutex::new(Vec::new()),
            device: Mutex::new(None),
            events: Publisher::new(),
            errors,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchdogEvent> {
        self.events.subscribe()
    }

    /// Subscribes to the three sources, seeds the caches from their snapshots and starts the
    /// listeners that keep the caches current.
    ///
    /// Subscribing happens before seeding, so a change racing with the snapshot is replayed
    /// by its event rather than lost. A listener that falls behind reseeds its cache the same
    /// way instead of working from a partial event stream.
    pub async fn attach(
        self: &Arc<Self>,
        gateways: &Arc<GatewayDiscoverer>,
        hosts: &Arc<HostMapper>,
        store: &Arc<MappingStore>,
        shutdown: &CancelToken,
    ) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let gateway_rx = gateways.subscribe();
        let host_rx = hosts.subscribe();
        let mapping_rx = store.subscribe();

        self.reseed_mappings(store).await?;
        self.reseed_hosts(hosts).await;
        self.reseed_device(gateways).await;

        let gateway_listener = {
            let this: Arc<Self> = self.clone();
            let again: Arc<Self> = self.clone();
            let gateways: Arc<GatewayDiscoverer> = gateways.clone();
            spawn_mirroring_listener(
                "watchdog/gateway",
                gateway_rx,
                shutdown.clone(),
                move |event| {
                    let this: Arc<Self> = this.clone();
                    async move { this.on_gateway_event(event).await }
                },
                move || {
                    let this: Arc<Self> = again.clone();
                    let gateways: Arc<GatewayDiscoverer> = gateways.clone();
                    async move { this.reseed_device(&gateways).await }
                },
            )
        };
        let host_listener = {
            let this: Arc<Self> = self.clone();
            let again: Arc<Self> = self.clone();
            let hosts: Arc<HostMapper> = hosts.clone();
            spawn_mirroring_listener(
                "watchdog/hosts",
                host_rx,
                shutdown.clone(),
                move |event| {
                    let this: Arc<Self> = this.clone();
                    async move { this.on_host_event(event).await }
                },
                move || {
                    let this: Arc<Self> = again.clone();
                    let hosts: Arc<HostMapper> = hosts.clone();
                    async move { this.reseed_hosts(&hosts).await }
                },
            )
        };
        let mapping_listener = {
            let this: Arc<Self> = self.clone();
            let again: Arc<Self> = self.clone();
            let store: Arc<MappingStore> = store.clone();
            spawn_mirroring_listener(
                "watchdog/mappings",
                mapping_rx,
                shutdown.clone(),
                move |event| {
                    let this: Arc<Self> = this.clone();
                    async move { this.on_mapping_event(event).await }
                },
                move || {
                    let this: Arc<Self> = again.clone();
                    let store: Arc<MappingStore> = store.clone();
                    async move {
                        if let Err(e) = this.reseed_mappings(&store).await {
                            this.errors.report("watchdog resync", &anyhow::Error::new(e));
                        }
                    }
                },
            )
        };

        Ok(vec![gateway_listener, host_listener, mapping_listener])
    }

    async fn reseed_mappings(&self, store: &MappingStore) -> NatResult<()> {
        let seeded: Vec<ManagedMapping> = store.snapshot().await?;
        *self.mappings.lock().await = seeded.into_iter().map(|m| (m.id, m)).collect();
        Ok(())
    }

    async fn reseed_hosts(&self, hosts: &HostMapper) {
        *self.hosts.lock().await = hosts.all_hosts().await;
    }

    async fn reseed_device(&self, gateways: &GatewayDiscoverer) {
        *self.device.lock().await = gateways.current_handle().await;
    }

    /// Whether the watchdog currently has a device to work on.
    pub async fn has_device(&self) -> bool {
        self.device.lock().await.is_some()
    }

    /// The watchdog's copy of the alive hosts.
    pub async fn known_hosts(&self) -> Vec<NetworkHost> {
        self.hosts.lock().await.clone()
    }

    /// The watchdog's copy of the managed mappings.
    pub async fn known_mappings(&self) -> Vec<ManagedMapping> {
        self.mappings.lock().await.values().cloned().collect()
    }

    pub async fn on_gateway_event(&self, event: GatewayEvent) {
        let mut device = self.device.lock().await;
        match event {
            GatewayEvent::Found(handle) => *device = Some(handle),
            GatewayEvent::Lost(_) => *device = None,
        }
    }

    pub async fn on_host_event(&self, event: HostEvent) {
        let mut hosts = self.hosts.lock().await;
        match event {
            HostEvent::Found(host) => {
                if !hosts.iter().any(|known| known.mac == host.mac) {
                    hosts.push(host);
                }
            }
            HostEvent::Lost(host) => {
                let mac: MacAddr = host.mac;
                hosts.retain(|known| known.mac != mac);
            }
        }
    }

    pub async fn on_mapping_event(&self, event: MappingEvent) {
        let mut mappings = self.mappings.lock().await;
        match event {
            MappingEvent::Created { mapping, .. } => {
                mappings.entry(mapping.id).or_insert(mapping);
            }
            MappingEvent::Updated { old, new, .. } => {
                mappings.remove(&old.id);
                mappings.insert(new.id, new);
            }
            MappingEvent::Deleted { mapping, .. } => {
                mappings.remove(&mapping.id);
            }
        }
    }

    /// Runs one removal pass and one creation pass against the current device.
    ///
    /// Per-entry failures are reported and counted; only a failure to read the device's
    /// table aborts the tick.
    pub async fn tick(&self) -> anyhow::Result<TickReport> {
        let mut report: TickReport = TickReport::default();
        let mut announcements: Vec<WatchdogEvent> = Vec::new();

        {
            let device_guard = self.device.lock().await;
            let Some(device) = device_guard.as_ref() else {
                return Ok(report);
            };

            let raw_table: Vec<RawMapping> = device.list_mappings().await?;
            let mode: BehaviourMode = self.policy.mode().await;

            let managed: HashMap<MappingId, ManagedMapping> = self.mappings.lock().await.clone();
            let hosts: Vec<NetworkHost> = self.hosts.lock().await.clone();
            let now: SystemTime = SystemTime::now();

            let mut remaining: Vec<RawMapping> = Vec::with_capacity(raw_table.len());
            for raw in raw_table {
                let verdict: Verdict = reconcile::classify(&raw, &managed, &hosts, now);
                let mut deleted: bool = false;

                if verdict.should_delete(mode) {
                    match device.delete_mapping(&raw).await {
                        Ok(()) => deleted = true,
                        Err(e) => {
                            report.failures += 1;
                            self.errors.report("watchdog removal", &e);
                        }
                    }
                }

                if verdict == Verdict::Unmanaged {
                    announcements.push(WatchdogEvent::UnknownMappingFound {
                        mapping: raw.clone(),
                        deleted,
                    });
                }

                if deleted {
                    debug!(verbosity = 1, "Removed {} entry on port {}: {verdict:?}", raw.protocol, raw.public_port);
                    if verdict != Verdict::Unmanaged {
                        announcements.push(WatchdogEvent::Removed {
                            mapping: raw.clone(),
                            verdict,
                        });
                    }
                    report.deleted.push(raw);
                } else {
                    remaining.push(raw);
                }
            }

            let managed: Vec<ManagedMapping> = self.mappings.lock().await.values().cloned().collect();
            let hosts: Vec<NetworkHost> = self.hosts.lock().await.clone();

            for wanted in reconcile::plan_creations(&managed, &hosts, &remaining) {
                match device.create_mapping(&wanted, Duration::ZERO).await {
                    Ok(()) => {
                        success!(
                            "Forwarding {} {} -> {}:{}",
                            wanted.protocol,
                            wanted.public_port,
                            wanted.private_ip,
                            wanted.private_port
                        );
                        announcements.push(WatchdogEvent::Created {
                            mapping: wanted.clone(),
                        });
                        report.created.push(wanted);
                    }
                    Err(e) => {
                        report.failures += 1;
                        self.errors.report("watchdog creation", &e);
                    }
                }
            }
        }

        for event in announcements {
            self.events.publish(event);
        }
        Ok(report)
    }

    pub fn spawn(self: &Arc<Self>, shutdown: &CancelToken) -> JoinHandle<()> {
        let this: Arc<Self> = self.clone();
        let shutdown: CancelToken = shutdown.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = this.tick().await {
                    this.errors.report("watchdog", &e);
                }

                let period: Duration = this
                    .config
                    .read_millis(&keys::WATCHDOG_UPDATE_FREQUENCY)
                    .unwrap_or_else(|e| {
                        this.errors.report("watchdog", &e);
                        FALLBACK_PERIOD
                    });
                if !shutdown.sleep(period).await {
                    break;
                }
            }
            debug!("Watchdog stopped");
        })
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

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use async_trait::async_trait;
    use natwarden_common::error::LogErrorSink;
    use natwarden_common::models::identity::UserId;
    use natwarden_common::models::mapping::Protocol;

    use super::*;
    use crate::gateway::GatewayDevice;

    #[derive(Default)]
    struct TableGateway {
        table: Mutex<Vec<RawMapping>>,
    }

    #[async_trait]
    impl GatewayDevice for TableGateway {
        fn kind(&self) -> &'static str {
            "table"
        }
        fn internal_ip(&self) -> Ipv4Addr {
            Ipv4Addr::new(192, 168, 1, 1)
        }
        fn client_internal_ip(&self) -> Ipv4Addr {
            Ipv4Addr::new(192, 168, 1, 2)
        }
        async fn external_ip(&self) -> anyhow::Result<Ipv4Addr> {
            Ok(Ipv4Addr::new(198, 51, 100, 1))
        }
        async fn list_mappings(&self) -> anyhow::Result<Vec<RawMapping>> {
            Ok(self.table.lock().await.clone())
        }
        async fn create_mapping(&self, mapping: &RawMapping, _: Duration) -> anyhow::Result<()> {
            self.table.lock().await.push(mapping.clone());
            Ok(())
        }
        async fn delete_mapping(&self, mapping: &RawMapping) -> anyhow::Result<()> {
            self.table.lock().await.retain(|m| m != mapping);
            Ok(())
        }
    }

    const MAC: MacAddr = MacAddr(0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF);

    fn mapping() -> ManagedMapping {
        let owner: UserId = UserId::new_random();
        ManagedMapping {
            id: MappingId::new_random(),
            owner,
            protocol: Protocol::Tcp,
            private_port: 8080,
            public_port: 9000,
            mac: MAC,
            description: String::new(),
            enabled: true,
            created_at: 0,
            created_by: owner,
        }
    }

    async fn watchdog(gateway: Arc<TableGateway>) -> Watchdog {
        let config: DynamicConfig = DynamicConfig::in_memory();
        let policy: Arc<BehaviourPolicy> = Arc::new(BehaviourPolicy::load(config.clone()).unwrap());
        let dog: Watchdog = Watchdog::new(config, policy, Arc::new(LogErrorSink));
        dog.on_gateway_event(GatewayEvent::Found(gateway)).await;
        dog
    }

    #[tokio::test]
    async fn no_device_means_no_work() {
        let config: DynamicConfig = DynamicConfig::in_memory();
        let policy: Arc<BehaviourPolicy> = Arc::new(BehaviourPolicy::load(config.clone()).unwrap());
        let dog: Watchdog = Watchdog::new(config, policy, Arc::new(LogErrorSink));
        assert!(dog.tick().await.unwrap().is_quiet());
    }

    #[tokio::test]
    async fn converges_in_one_tick() {
        let gateway: Arc<TableGateway> = Arc::new(TableGateway::default());
        let dog: Watchdog = watchdog(gateway.clone()).await;
        let wanted: ManagedMapping = mapping();

        dog.on_mapping_event(MappingEvent::Created {
            mapping: wanted.clone(),
            caller: wanted.owner,
        })
        .await;
        dog.on_host_event(HostEvent::Found(NetworkHost::new(Ipv4Addr::new(192, 168, 1, 50), MAC)))
            .await;

        let first: TickReport = dog.tick().await.unwrap();
        assert_eq!(first.created.len(), 1);
        assert_eq!(first.created[0].correlation_id(), Some(wanted.id));

        let second: TickReport = dog.tick().await.unwrap();
        assert!(second.is_quiet());
    }

    #[tokio::test]
    async fn update_replaces_cached_mapping() {
        let gateway: Arc<TableGateway> = Arc::new(TableGateway::default());
        let dog: Watchdog = watchdog(gateway.clone()).await;
        let old: ManagedMapping = mapping();
        dog.on_mapping_event(MappingEvent::Created {
            mapping: old.clone(),
            caller: old.owner,
        })
        .await;
        dog.on_host_event(HostEvent::Found(NetworkHost::new(Ipv4Addr::new(192, 168, 1, 50), MAC)))
            .await;
        dog.tick().await.unwrap();

        let mut new: ManagedMapping = old.clone();
        new.public_port = 9100;
        dog.on_mapping_event(MappingEvent::Updated {
            old,
            new,
            caller: UserId::new_random(),
        })
        .await;

        let report: TickReport = dog.tick().await.unwrap();
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.created.len(), 1);
        assert_eq!(gateway.table.lock().await[0].public_port, 9100);
    }

    #[tokio::test]
    async fn unknown_entry_is_announced() {
        let gateway: Arc<TableGateway> = Arc::new(TableGateway::default());
        let foreign: RawMapping =
            RawMapping::permanent(Protocol::Udp, Ipv4Addr::new(192, 168, 1, 9), 53, 53, "not ours");
        gateway.table.lock().await.push(foreign.clone());
        let dog: Watchdog = watchdog(gateway.clone()).await;
        let mut events = dog.subscribe();

        dog.tick().await.unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            WatchdogEvent::UnknownMappingFound {
                mapping: foreign,
                deleted: true
            }
        );
        assert!(gateway.table.lock().await.is_empty());
    }

    #[tokio::test]
    async fn lost_gateway_stops_work() {
        let gateway: Arc<TableGateway> = Arc::new(TableGateway::default());
        let dog: Watchdog = watchdog(gateway.clone()).await;
        dog.on_gateway_event(GatewayEvent::Lost(gateway.clone())).await;

        let wanted: ManagedMapping = mapping();
        dog.on_mapping_event(MappingEvent::Created {
            mapping: wanted.clone(),
            caller: wanted.owner,
        })
        .await;
        dog.on_host_event(HostEvent::Found(NetworkHost::new(Ipv4Addr::new(192, 168, 1, 50), MAC)))
            .await;

        assert!(dog.tick().await.unwrap().is_quiet());
        assert!(gateway.table.lock().await.is_empty());
    }
}
