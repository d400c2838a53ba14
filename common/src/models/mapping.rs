// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Managed Mapping Model
//!
//! A [`ManagedMapping`] is a port forward an administrator asked for. It names its target by
//! MAC address rather than IP, since DHCP may hand the target a different address at any time;
//! the watchdog resolves the MAC against the live host inventory on every tick.

use std::fmt;
use std::str::FromStr;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use super::guid::{Guid, GuidParseError};
use super::identity::UserId;
use crate::utils::mac;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingId(pub Guid);

impl MappingId {
    pub fn new_random() -> Self {
        MappingId(Guid::new_random())
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MappingId {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MappingId)
    }
}

/// The user-editable part of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub protocol: Protocol,
    pub private_port: u16,
    pub public_port: u16,
    #[serde(with = "mac::serde_text")]
    pub mac: MacAddr,
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedMapping {
    pub id: MappingId,
    pub owner: UserId,
    pub protocol: Protocol,
    pub private_port: u16,
    pub public_port: u16,
    #[serde(with = "mac::serde_text")]
    pub mac: MacAddr,
    pub description: String,
    pub enabled: bool,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub created_by: UserId,
}

impl ManagedMapping {
    pub fn config(&self) -> MappingConfig {
        MappingConfig {
            protocol: self.protocol,
            private_port: self.private_port,
            public_port: self.public_port,
            mac: self.mac,
            description: self.description.clone(),
            enabled: self.enabled,
        }
    }

    /// Returns a copy with every user-editable field replaced.
    pub fn with_config(&self, config: MappingConfig) -> Self {
        Self {
            protocol: config.protocol,
            private_port: config.private_port,
            public_port: config.public_port,
            mac: config.mac,
            description: config.description,
            enabled: config.enabled,
            ..self.clone()
        }
    }

    pub fn with_owner(&self, owner: UserId) -> Self {
        Self {
            owner,
            ..self.clone()
        }
    }

    /// Whether this mapping claims `(public_port, protocol)` for uniqueness purposes.
    pub fn occupies(&self, public_port: u16, protocol: Protocol) -> bool {
        self.enabled && self.public_port == public_port && self.protocol == protocol
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
