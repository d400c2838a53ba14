// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::net::Ipv4Addr;

use pnet::ipnetwork::Ipv4Network;

use crate::debug;

/// Inclusive range of IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Self {
        if u32::from(start) <= u32::from(end) {
            Self {
                start_addr: start,
                end_addr: end,
            }
        } else {
            debug!(verbosity = 2, "{start} > {end}, reversing range");
            Self {
                start_addr: end,
                end_addr: start,
            }
        }
    }

    /// Network through broadcast address of the subnet `ip/prefix` belongs to.
    pub fn subnet_of(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Self> {
        let network: Ipv4Network = Ipv4Network::new(ip, prefix)?;
        Ok(Self::new(network.network(), network.broadcast()))
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(Ipv4Addr::from)
    }

    pub fn contains(&self, ip: &Ipv4Addr) -> bool {
        let ip_u32: u32 = (*ip).into();
        ip_u32 >= u32::from(self.start_addr) && ip_u32 <= u32::from(self.end_addr)
    }

    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end_addr)) - u64::from(u32::from(self.start_addr)) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
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
