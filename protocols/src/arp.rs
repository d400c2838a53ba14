// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Neighbour (ARP) table lookups.
//!
//! Rather than crafting ARP frames on a raw socket, the scanner first talks to the target
//! over a normal socket, which makes the kernel resolve the neighbour. The resolved entry
//! is then read back from `/proc/net/arp`.

use std::net::Ipv4Addr;

use pnet::util::MacAddr;

use natwarden_common::utils::mac;

/// ATF_COM: the entry is complete.
const ATF_COM: u32 = 0x2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub device: String,
}

/// Parses the `/proc/net/arp` text format, skipping incomplete entries.
pub fn parse_neighbour_table(text: &str) -> Vec<NeighbourEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 {
                return None;
            }

            let ip: Ipv4Addr = cols[0].parse().ok()?;
            let flags: u32 = u32::from_str_radix(cols[2].trim_start_matches("0x"), 16).ok()?;
            if flags & ATF_COM == 0 {
                return None;
            }

            let mac: MacAddr = mac::parse(cols[3])?;
            if mac == MacAddr::zero() {
                return None;
            }

            Some(NeighbourEntry {
                ip,
                mac,
                device: cols[5].to_string(),
            })
        })
        .collect()
}

/// MAC of `ip` according to the kernel's neighbour table.
#[cfg(target_os = "linux")]
pub async fn lookup(ip: Ipv4Addr) -> anyhow::Result<Option<MacAddr>> {
    let text: String = tokio::fs::read_to_string(crate::utils::PROC_NET_ARP).await?;
    Ok(parse_neighbour_table(&text)
        .into_iter()
        .find(|entry| entry.ip == ip)
        .map(|entry| entry.mac))
}

#[cfg(not(target_os = "linux"))]
pub async fn lookup(_ip: Ipv4Addr) -> anyhow::Result<Option<MacAddr>> {
    anyhow::bail!("neighbour table lookups are only implemented for Linux")
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
