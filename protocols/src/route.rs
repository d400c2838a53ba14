// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::net::Ipv4Addr;

const RTF_UP: u32 = 0x1;
const RTF_GATEWAY: u32 = 0x2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub device: String,
    pub gateway: Ipv4Addr,
    pub metric: u32,
}

/// Picks the lowest-metric default route out of the `/proc/net/route` text format.
///
/// Addresses in that file are host-order hex, i.e. little endian on every platform Linux
/// commonly runs on.
pub fn parse_default_route(text: &str) -> Option<DefaultRoute> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 7 || cols[1] != "00000000" {
                return None;
            }

            let flags: u32 = u32::from_str_radix(cols[3], 16).ok()?;
            if flags & (RTF_UP | RTF_GATEWAY) != (RTF_UP | RTF_GATEWAY) {
                return None;
            }

            let raw: u32 = u32::from_str_radix(cols[2], 16).ok()?;
            let gateway: Ipv4Addr = Ipv4Addr::from(raw.to_le_bytes());
            if gateway.is_unspecified() {
                return None;
            }

            Some(DefaultRoute {
                device: cols[0].to_string(),
                gateway,
                metric: cols[6].parse().ok()?,
            })
        })
        .min_by_key(|route| route.metric)
}

#[cfg(target_os = "linux")]
pub async fn default_route() -> anyhow::Result<Option<DefaultRoute>> {
    let text: String = tokio::fs::read_to_string(crate::utils::PROC_NET_ROUTE).await?;
    Ok(parse_default_route(&text))
}

#[cfg(not(target_os = "linux"))]
pub async fn default_route() -> anyhow::Result<Option<DefaultRoute>> {
    anyhow::bail!("route table lookups are only implemented for Linux")
}
