// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Launch Settings
//!
//! The TOML file read once at start-up. It says which discovery protocols to use, where the
//! runtime configuration is persisted and which users and mappings exist initially:
//!
//! ```toml
//! protocols = "upnp,pmp"
//! config_store = "/var/lib/natwarden/config.bin"
//!
//! [[users]]
//! id = "5f0c2a9e-3b7d-4c11-9a42-0d6f1e2b3c4d"
//! permissions = 31
//!
//! [[mappings]]
//! owner = "5f0c2a9e-3b7d-4c11-9a42-0d6f1e2b3c4d"
//! protocol = "tcp"
//! private_port = 8080
//! public_port = 9000
//! mac = "AA:BB:CC:DD:EE:FF"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Deserialize;

use natwarden_common::models::gateway::DiscoveryProtocols;
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::models::mapping::Protocol;
use natwarden_common::utils::mac;
use natwarden_common::warn;
use natwarden_core::mapping::NewMapping;

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchSettings {
    /// Comma separated, `upnp` and/or `pmp`. Both when absent.
    pub protocols: Option<String>,
    /// Where runtime configuration is persisted. In memory when absent.
    pub config_store: Option<PathBuf>,
    pub users: Vec<UserSeed>,
    pub mappings: Vec<MappingSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSeed {
    pub id: UserId,
    #[serde(default)]
    pub permissions: u32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingSeed {
    pub owner: UserId,
    pub protocol: String,
    pub private_port: u16,
    pub public_port: u16,
    pub mac: String,
    pub description: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl LaunchSettings {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("No launch settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text: String = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn discovery_protocols(&self) -> anyhow::Result<DiscoveryProtocols> {
        match &self.protocols {
            Some(list) => list.parse().map_err(anyhow::Error::msg),
            None => Ok(DiscoveryProtocols::ALL),
        }
    }
}

impl UserSeed {
    pub fn to_info(&self) -> UserInfo {
        let mut info: UserInfo = UserInfo::new(self.id, Permissions::from_bits(self.permissions));
        info.enabled = self.enabled;
        info
    }
}

impl MappingSeed {
    pub fn to_request(&self) -> anyhow::Result<NewMapping> {
        let protocol: Protocol = self.protocol.parse().map_err(anyhow::Error::msg)?;
        let mac = mac::parse(&self.mac).ok_or_else(|| anyhow!("'{}' is not a MAC address", self.mac))?;

        Ok(NewMapping {
            owner: self.owner,
            protocol,
            private_port: self.private_port,
            public_port: self.public_port,
            mac: mac::to_bytes(mac).to_vec(),
            description: self.description.clone(),
            enabled: self.enabled,
        })
    }
}
