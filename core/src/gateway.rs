// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Gateway discovery and health tracking.
//!
//! The [`GatewayDiscoverer`] tracks at most one NAT device. A heartbeat loop checks that the
//! tracked device still answers, drops it (emitting [`GatewayEvent::Lost`]) when it does not,
//! and runs discovery while nothing is tracked. Discovery itself is delegated to a
//! [`GatewayLocator`], so the UPnP/NAT-PMP details stay in [`locator`].

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use natwarden_common::cancel::CancelToken;
use natwarden_common::config::{DynamicConfig, keys};
use natwarden_common::error::SharedErrorSink;
use natwarden_common::events::Publisher;
use natwarden_common::models::gateway::{DiscoveryProtocols, RawMapping};
use natwarden_common::{debug, success, warn};

use crate::network::scanner::NetworkScanner;

pub mod locator;
mod natpmp;
mod upnp;

pub use locator::SystemLocator;

const FALLBACK_HEARTBEAT: Duration = Duration::from_millis(3000);

/// A NAT device that can list and edit its forwarding table.
#[async_trait]
pub trait GatewayDevice: Send + Sync {
    /// Short protocol name for logs, e.g. `UPnP`.
    fn kind(&self) -> &'static str;

    /// The device's LAN-facing address.
    fn internal_ip(&self) -> Ipv4Addr;

    /// This host's address on the interface facing the device.
    fn client_internal_ip(&self) -> Ipv4Addr;

    async fn external_ip(&self) -> anyhow::Result<Ipv4Addr>;

    async fn list_mappings(&self) -> anyhow::Result<Vec<RawMapping>>;

    /// Creates `mapping`. A zero `lifetime` asks for a permanent entry.
    async fn create_mapping(&self, mapping: &RawMapping, lifetime: Duration) -> anyhow::Result<()>;

    async fn delete_mapping(&self, mapping: &RawMapping) -> anyhow::Result<()>;
}

pub type GatewayHandle = Arc<dyn GatewayDevice>;

#[async_trait]
pub trait GatewayLocator: Send + Sync {
    /// Looks for a gateway speaking one of `protocols`. Not finding one is `None`, not an error.
    async fn discover(&self, protocols: DiscoveryProtocols, timeout: Duration) -> Option<GatewayHandle>;
}

#[derive(Clone)]
pub enum GatewayEvent {
    Found(GatewayHandle),
    Lost(GatewayHandle),
}

impl GatewayEvent {
    pub fn handle(&self) -> &GatewayHandle {
        match self {
            GatewayEvent::Found(handle) | GatewayEvent::Lost(handle) => handle,
        }
    }
}

impl fmt::Debug for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, handle) = match self {
            GatewayEvent::Found(handle) => ("Found", handle),
            GatewayEvent::Lost(handle) => ("Lost", handle),
        };
        write!(f, "{name}({} gateway at {})", handle.kind(), handle.internal_ip())
    }
}

pub struct GatewayDiscoverer {
    locator: Arc<dyn GatewayLocator>,
    scanner: Arc<dyn NetworkScanner>,
    config: DynamicConfig,
    protocols: DiscoveryProtocols,
    current: Mutex<Option<GatewayHandle>>,
    events: Publisher<GatewayEvent>,
    errors: SharedErrorSink,
}

impl GatewayDiscoverer {
    pub fn new(
        locator: Arc<dyn GatewayLocator>,
        scanner: Arc<dyn NetworkScanner>,
        config: DynamicConfig,
        protocols: DiscoveryProtocols,
        errors: SharedErrorSink,
    ) -> Self {
        Self {
            locator,
            scanner,
            config,
            protocols,
            current: Mutex::new(None),
            events: Publisher::new(),
            errors,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn protocols(&self) -> DiscoveryProtocols {
        self.protocols
    }

    pub async fn discover_once(
        &self,
        protocols: DiscoveryProtocols,
        timeout: Duration,
    ) -> Option<GatewayHandle> {
        if protocols.is_empty() {
            return None;
        }

        match tokio::time::timeout(timeout, self.locator.discover(protocols, timeout)).await {
            Ok(found) => found,
            Err(_elapsed) => {
                debug!(verbosity = 1, "Gateway discovery timed out after {timeout:?}");
                None
            }
        }
    }

    pub async fn current_handle(&self) -> Option<GatewayHandle> {
        self.current.lock().await.clone()
    }

    pub async fn is_responsive(&self) -> bool {
        match self.current_handle().await {
            Some(handle) => self.scanner.host_up(handle.internal_ip()).await.is_some(),
            None => false,
        }
    }

    /// One heartbeat: drop an unresponsive gateway, then discover if nothing is tracked.
    pub async fn heartbeat(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.current_handle().await {
            if self.scanner.host_up(handle.internal_ip()).await.is_some() {
                return Ok(());
            }

            let lost: Option<GatewayHandle> = {
                let mut current = self.current.lock().await;
                match current.as_ref() {
                    Some(tracked) if Arc::ptr_eq(tracked, &handle) => current.take(),
                    _ => None,
                }
            };

            if let Some(lost) = lost {
                warn!("{} gateway at {} stopped responding", lost.kind(), lost.internal_ip());
                self.events.publish(GatewayEvent::Lost(lost));
            }
        }

        let timeout: Duration = self.config.read_millis(&keys::GATEWAY_DISCOVERY_TIMEOUT)?;
        let Some(found) = self.discover_once(self.protocols, timeout).await else {
            return Ok(());
        };

        {
            let mut current = self.current.lock().await;
            if current.is_some() {
                return Ok(());
            }
            *current = Some(found.clone());
        }

        success!("Found {} gateway at {}", found.kind(), found.internal_ip());
        self.events.publish(GatewayEvent::Found(found));
        Ok(())
    }

    pub fn spawn(self: &Arc<Self>, shutdown: &CancelToken) -> JoinHandle<()> {
        let this: Arc<Self> = self.clone();
        let shutdown: CancelToken = shutdown.clone();

        tokio::spawn(async move {
            loop {
                if let Err(e) = this.heartbeat().await {
                    this.errors.report("gateway heartbeat", &e);
                }

                let period: Duration = match this.config.read_millis(&keys::GATEWAY_HEARTBEAT_FREQUENCY) {
                    Ok(period) => period,
                    Err(e) => {
                        this.errors.report("gateway heartbeat", &e);
                        FALLBACK_HEARTBEAT
                    }
                };
                if !shutdown.sleep(period).await {
                    break;
                }
            }
            debug!("Gateway heartbeat stopped");
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
