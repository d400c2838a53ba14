// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::system_conf::read_system_conf;
use pnet::util::MacAddr;
use tokio::net::TcpStream;
use tokio::time::timeout;

use natwarden_common::interface::{self, LocalInterface};
use natwarden_common::{debug, warn};
use natwarden_protocols::{arp, dns};

const HANDSHAKE_PORT: u16 = 443;
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);
const FALLBACK_NAMESERVER: &str = "1.1.1.1:53";

/// Everything the daemon needs to ask the LAN about a single address.
#[async_trait]
pub trait NetworkScanner: Send + Sync {
    /// Round trip of a successful liveness check, `None` if `ip` did not answer.
    async fn host_up(&self, ip: Ipv4Addr) -> Option<Duration>;

    async fn resolve_mac(&self, ip: Ipv4Addr) -> Option<MacAddr>;

    async fn hostname(&self, ip: Ipv4Addr) -> Option<String>;

    /// The local interface that owns `ip` as its own address.
    fn interface_with_address(&self, ip: Ipv4Addr) -> Option<LocalInterface>;
}

/// Scans the real network: TCP handshakes for liveness, the kernel neighbour table for
/// MACs and a PTR query to the system resolver for names.
pub struct SystemScanner {
    timeout: Duration,
    nameserver: SocketAddr,
}

impl SystemScanner {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HANDSHAKE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            nameserver: system_nameserver(),
        }
    }
}

impl Default for SystemScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn system_nameserver() -> SocketAddr {
    let configured: Option<SocketAddr> = match read_system_conf() {
        Ok((config, _options)) => config.name_servers().first().map(|ns| ns.socket_addr),
        Err(e) => {
            warn!("Could not read the system resolver configuration: {e}");
            None
        }
    };

    configured.unwrap_or_else(|| {
        FALLBACK_NAMESERVER
            .parse()
            .unwrap_or(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(1, 1, 1, 1), 53)))
    })
}

#[async_trait]
impl NetworkScanner for SystemScanner {
    async fn host_up(&self, ip: Ipv4Addr) -> Option<Duration> {
        let socket_addr: SocketAddr = SocketAddr::V4(SocketAddrV4::new(ip, HANDSHAKE_PORT));

        let start: Instant = Instant::now();
        match timeout(self.timeout, TcpStream::connect(socket_addr)).await {
            // A refused connection still proves something answered.
            Ok(Ok(_)) | Ok(Err(_)) => Some(start.elapsed()),
            Err(_elapsed) => None,
        }
    }

    async fn resolve_mac(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        match arp::lookup(ip).await {
            Ok(mac) => mac,
            Err(e) => {
                debug!(verbosity = 2, "Neighbour lookup for {ip} failed: {e}");
                None
            }
        }
    }

    async fn hostname(&self, ip: Ipv4Addr) -> Option<String> {
        match dns::reverse_lookup(self.nameserver, ip, self.timeout).await {
            Ok(name) => name,
            Err(e) => {
                debug!(verbosity = 2, "Reverse lookup for {ip} failed: {e}");
                None
            }
        }
    }

    fn interface_with_address(&self, ip: Ipv4Addr) -> Option<LocalInterface> {
        interface::interface_with_address(ip)
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
