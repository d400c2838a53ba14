// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! What a NAT gateway reports about itself and its forwarding table.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::mapping::{ManagedMapping, MappingId, Protocol};

/// A forwarding entry exactly as the gateway reports it.
///
/// Entries created by the watchdog carry the managed mapping's id in `description`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMapping {
    pub protocol: Protocol,
    pub private_ip: Ipv4Addr,
    pub private_port: u16,
    pub public_port: u16,
    pub description: String,
    /// `None` for permanent entries.
    pub expires_at: Option<SystemTime>,
}

impl RawMapping {
    pub fn permanent(
        protocol: Protocol,
        private_ip: Ipv4Addr,
        private_port: u16,
        public_port: u16,
        description: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            private_ip,
            private_port,
            public_port,
            description: description.into(),
            expires_at: None,
        }
    }

    /// The managed mapping this entry claims to belong to, if the description is an id.
    pub fn correlation_id(&self) -> Option<MappingId> {
        self.description.parse::<MappingId>().ok()
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Port and protocol equality. Address and description are not compared.
    pub fn matches(&self, managed: &ManagedMapping) -> bool {
        self.public_port == managed.public_port
            && self.private_port == managed.private_port
            && self.protocol == managed.protocol
    }
}

/// Which discovery protocols the gateway discoverer may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryProtocols(u8);

impl DiscoveryProtocols {
    pub const NONE: DiscoveryProtocols = DiscoveryProtocols(0);
    pub const UPNP: DiscoveryProtocols = DiscoveryProtocols(1);
    pub const PMP: DiscoveryProtocols = DiscoveryProtocols(2);
    pub const ALL: DiscoveryProtocols = DiscoveryProtocols(3);

    pub const fn contains(&self, other: DiscoveryProtocols) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn union(self, other: DiscoveryProtocols) -> Self {
        DiscoveryProtocols(self.0 | other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for DiscoveryProtocols {
    fn default() -> Self {
        DiscoveryProtocols::ALL
    }
}

impl fmt::Display for DiscoveryProtocols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = Vec::new();
        if self.contains(DiscoveryProtocols::UPNP) {
            names.push("upnp");
        }
        if self.contains(DiscoveryProtocols::PMP) {
            names.push("pmp");
        }
        if names.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", names.join(","))
    }
}

impl FromStr for DiscoveryProtocols {
    type Err = String;

    /// Comma separated list, e.g. `upnp,pmp`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(DiscoveryProtocols::NONE, |acc, part| {
                match part.to_ascii_lowercase().as_str() {
                    "upnp" => Ok(acc.union(DiscoveryProtocols::UPNP)),
                    "pmp" | "natpmp" | "nat-pmp" => Ok(acc.union(DiscoveryProtocols::PMP)),
                    other => Err(format!("unknown discovery protocol '{other}'")),
                }
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
