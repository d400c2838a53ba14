// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Network Host Model
//!
//! A [`NetworkHost`] is a LAN device the host mapper has confirmed as reachable and whose MAC
//! address it resolved.
//!
//! ## Key Concepts
//! * **Identity**: the MAC address. Two hosts with the same MAC are the same device, even if the
//!   IP moved; two hosts with the same IP but different MACs are a DHCP reassignment.
//! * **Ephemeral**: hosts live in memory only and are rebuilt from the network after a restart.
//! * **Enrichment**: hostname and vendor are best effort and purely informational.

use std::net::Ipv4Addr;
use std::time::Duration;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::utils::mac;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHost {
    pub ip: Ipv4Addr,

    #[serde(with = "mac::serde_text")]
    pub mac: MacAddr,

    /// Reverse DNS name, if it resolved to something other than the address itself.
    pub hostname: Option<String>,

    /// Manufacturer derived from the MAC's OUI.
    pub vendor: Option<String>,

    /// Round trip of the handshake that last confirmed the host.
    pub last_rtt: Option<Duration>,
}

impl NetworkHost {
    pub fn new(ip: Ipv4Addr, mac: MacAddr) -> Self {
        Self {
            ip,
            mac,
            hostname: None,
            vendor: None,
            last_rtt: None,
        }
    }

    /// Looks the vendor up in the OUI database.
    pub fn with_vendor_lookup(mut self) -> Self {
        self.vendor = mac::get_vendor(self.mac);
        self
    }

    /// Stores `hostname` unless it is just the textual IP.
    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname
            .map(|name| name.trim_end_matches('.').to_string())
            .filter(|name| !name.is_empty() && *name != self.ip.to_string());
        self
    }

    pub fn with_rtt(mut self, rtt: Duration) -> Self {
        self.last_rtt = Some(rtt);
        self
    }

    pub fn is_same_device(&self, other: &NetworkHost) -> bool {
        self.mac == other.mac
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
