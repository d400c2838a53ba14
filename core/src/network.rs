// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Live host inventory of the gateway's subnet.
//!
//! The [`HostMapper`] runs two independent loops over one shared host set:
//! - **Discovery**: sweeps the subnet facing the current gateway and adds every host that
//!   answers and whose MAC can be resolved.
//! - **Liveness**: re-checks every known host and drops the ones that went silent or whose
//!   address now belongs to another MAC.
//!
//! Probing happens without holding the host lock; the lock only guards the set itself.
//! Whenever the gateway changes, the set is cleared and an in-flight sweep is cancelled.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use pnet::util::MacAddr;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use natwarden_common::cancel::{CancelHandle, CancelToken};
use natwarden_common::config::{ConfigKey, DynamicConfig, keys};
use natwarden_common::error::SharedErrorSink;
use natwarden_common::events::{Publisher, spawn_listener};
use natwarden_common::interface::LocalInterface;
use natwarden_common::models::host::NetworkHost;
use natwarden_common::models::range::Ipv4Range;
use natwarden_common::utils::ip;
use natwarden_common::{debug, info};

use crate::gateway::{GatewayDiscoverer, GatewayEvent, GatewayHandle};

pub mod fanout;
pub mod scanner;

use scanner::NetworkScanner;

const FALLBACK_PERIOD: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Found(NetworkHost),
    Lost(NetworkHost),
}

pub struct HostMapper {
    scanner: Arc<dyn NetworkScanner>,
    gateways: Arc<GatewayDiscoverer>,
    config: DynamicConfig,
    hosts: Mutex<Vec<NetworkHost>>,
    sweep: Mutex<Option<CancelHandle>>,
    events: Publisher<HostEvent>,
    errors: SharedErrorSink,
}

impl HostMapper {
    pub fn new(
        scanner: Arc<dyn NetworkScanner>,
        gateways: Arc<GatewayDiscoverer>,
        config: DynamicConfig,
        errors: SharedErrorSink,
    ) -> Self {
        Self {
            scanner,
            gateways,
            config,
            hosts: Mutex::new(Vec::new()),
            sweep: Mutex::new(None),
            events: Publisher::new(),
            errors,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Independent snapshot of the alive hosts.
    pub async fn all_hosts(&self) -> Vec<NetworkHost> {
        self.hosts.lock().await.clone()
    }

    pub async fn host_by_mac(&self, mac: MacAddr) -> Option<NetworkHost> {
        self.hosts.lock().await.iter().find(|h| h.mac == mac).cloned()
    }

    pub async fn host_by_ip(&self, ip: Ipv4Addr) -> Option<NetworkHost> {
        self.hosts.lock().await.iter().find(|h| h.ip == ip).cloned()
    }

    fn parallelism(&self) -> anyhow::Result<usize> {
        let configured: u64 = self.config.read(&keys::NETWORK_DEGREE_OF_PARALLELISM)?;
        Ok(usize::try_from(configured).unwrap_or(usize::MAX).max(1))
    }

    /// Sweeps the gateway's subnet once and returns how many new hosts were added.
    ///
    /// Results of a cancelled sweep are thrown away.
    pub async fn discover(&self, cancel: &CancelToken) -> anyhow::Result<usize> {
        let Some(gateway) = self.gateways.current_handle().await else {
            return Ok(0);
        };

        let local: LocalInterface = self
            .scanner
            .interface_with_address(gateway.client_internal_ip())
            .ok_or_else(|| anyhow!("no local interface owns {}", gateway.client_internal_ip()))?;
        let range: Ipv4Range = Ipv4Range::subnet_of(gateway.internal_ip(), local.prefix)?;
        debug!(
            verbosity = 1,
            "Sweeping {} - {} ({} addresses) via {}",
            range.start_addr,
            range.end_addr,
            range.len(),
            local.name
        );

        let scanner: Arc<dyn NetworkScanner> = self.scanner.clone();
        let found: Vec<NetworkHost> = fanout::for_each_bounded(
            range.iter().filter(ip::is_scan_candidate),
            self.parallelism()?,
            cancel,
            move |target| {
                let scanner: Arc<dyn NetworkScanner> = scanner.clone();
                async move { scan_host(scanner.as_ref(), target).await }
            },
        )
        .await;

        let added: Vec<NetworkHost> = {
            let mut hosts = self.hosts.lock().await;
            // A gateway change cancels before it clears, so checking under the lock keeps
            // old-subnet results out of a freshly cleared set.
            if cancel.is_cancelled() {
                debug!("Sweep cancelled, {} results dropped", found.len());
                return Ok(0);
            }
            let mut added: Vec<NetworkHost> = Vec::new();
            for host in found {
                if hosts.iter().any(|known| known.is_same_device(&host)) {
                    continue;
                }
                hosts.push(host.clone());
                added.push(host);
            }
            added
        };

        let count: usize = added.len();
        for host in added {
            self.events.publish(HostEvent::Found(host));
        }
        Ok(count)
    }

    /// Re-verifies every known host and returns how many were dropped.
    pub async fn check_liveness(&self, cancel: &CancelToken) -> anyhow::Result<usize> {
        let snapshot: Vec<NetworkHost> = self.all_hosts().await;
        if snapshot.is_empty() {
            return Ok(0);
        }

        let scanner: Arc<dyn NetworkScanner> = self.scanner.clone();
        let stale: Vec<NetworkHost> = fanout::for_each_bounded(
            snapshot,
            self.parallelism()?,
            cancel,
            move |host| {
                let scanner: Arc<dyn NetworkScanner> = scanner.clone();
                async move { (!verify_host(scanner.as_ref(), &host).await).then_some(host) }
            },
        )
        .await;

        if cancel.is_cancelled() {
            return Ok(0);
        }

        let removed: Vec<NetworkHost> = {
            let mut hosts = self.hosts.lock().await;
            let mut removed: Vec<NetworkHost> = Vec::new();
            hosts.retain(|known| {
                let gone: bool = stale.iter().any(|s| s.mac == known.mac && s.ip == known.ip);
                if gone {
                    removed.push(known.clone());
                }
                !gone
            });
            removed
        };

        let count: usize = removed.len();
        for host in removed {
            self.events.publish(HostEvent::Lost(host));
        }
        Ok(count)
    }

    /// Drops every host, emitting one `Lost` per host.
    pub async fn clear(&self) {
        let removed: Vec<NetworkHost> = std::mem::take(&mut *self.hosts.lock().await);
        for host in removed {
            self.events.publish(HostEvent::Lost(host));
        }
    }

    /// Cancels a running sweep and forgets every host.
    pub async fn on_gateway_changed(&self, event: GatewayEvent) {
        let handle: &GatewayHandle = event.handle();
        info!(
            verbosity = 1,
            "Gateway {} changed, resetting host inventory",
            handle.internal_ip()
        );

        if let Some(sweep) = self.sweep.lock().await.take() {
            sweep.cancel();
        }
        self.clear().await;
    }

    fn period(&self, key: &ConfigKey<u64>, origin: &'static str) -> Duration {
        self.config.read_millis(key).unwrap_or_else(|e| {
            self.errors.report(origin, &e);
            FALLBACK_PERIOD
        })
    }

    /// Starts the discovery loop, the liveness loop and the gateway listener.
    pub fn spawn(self: &Arc<Self>, shutdown: &CancelToken) -> Vec<JoinHandle<()>> {
        let discovery: JoinHandle<()> = {
            let this: Arc<Self> = self.clone();
            let shutdown: CancelToken = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let (handle, token) = shutdown.child();
                    *this.sweep.lock().await = Some(handle);

                    if let Err(e) = this.discover(&token).await {
                        this.errors.report("host discovery", &e);
                    }

                    let period = this.period(&keys::NETWORK_DISCOVERY_FREQUENCY, "host discovery");
                    if !shutdown.sleep(period).await {
                        break;
                    }
                }
            })
        };

        let liveness: JoinHandle<()> = {
            let this: Arc<Self> = self.clone();
            let shutdown: CancelToken = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let period = this.period(&keys::NETWORK_HEARTBEAT_FREQUENCY, "host liveness");
                    if !shutdown.sleep(period).await {
                        break;
                    }

                    if let Err(e) = this.check_liveness(&shutdown).await {
                        this.errors.report("host liveness", &e);
                    }
                }
            })
        };

        let this: Arc<Self> = self.clone();
        let listener: JoinHandle<()> = spawn_listener(
            "host mapper",
            self.gateways.subscribe(),
            shutdown.clone(),
            move |event: GatewayEvent| {
                let this: Arc<Self> = this.clone();
                async move { this.on_gateway_changed(event).await }
            },
        );

        vec![discovery, liveness, listener]
    }
}

/// MAC of `ip`; our own address is answered from the local interface.
async fn identify(scanner: &dyn NetworkScanner, ip: Ipv4Addr) -> Option<MacAddr> {
    match scanner.interface_with_address(ip) {
        Some(local) => Some(local.mac),
        None => scanner.resolve_mac(ip).await,
    }
}

async fn scan_host(scanner: &dyn NetworkScanner, ip: Ipv4Addr) -> Option<NetworkHost> {
    let host: NetworkHost = match scanner.interface_with_address(ip) {
        Some(local) => NetworkHost::new(ip, local.mac),
        None => {
            let rtt: Duration = scanner.host_up(ip).await?;
            let mac: MacAddr = scanner.resolve_mac(ip).await?;
            NetworkHost::new(ip, mac).with_rtt(rtt)
        }
    };

    let hostname: Option<String> = scanner.hostname(ip).await;
    Some(host.with_hostname(hostname).with_vendor_lookup())
}

async fn verify_host(scanner: &dyn NetworkScanner, host: &NetworkHost) -> bool {
    if scanner.interface_with_address(host.ip).is_none() && scanner.host_up(host.ip).await.is_none() {
        return false;
    }
    identify(scanner, host.ip).await == Some(host.mac)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
