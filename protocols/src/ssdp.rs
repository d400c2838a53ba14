// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! SSDP search for Internet Gateway Devices.

use std::time::Duration;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};

use natwarden_common::debug;

use crate::utils::{MAX_UDP_DATAGRAM, SSDP_ADDR};

pub const IGD_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";

/// Builds the `M-SEARCH` datagram; `mx` is the responder's max wait in seconds.
pub fn create_search_packet(search_target: &str, mx: u8) -> Vec<u8> {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_ADDR}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {search_target}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Pulls the `LOCATION` header out of a search response.
pub fn parse_location(payload: &[u8]) -> Option<String> {
    let text: &str = std::str::from_utf8(payload).ok()?;
    let mut lines = text.lines();

    let status: &str = lines.next()?;
    if !status.starts_with("HTTP/1.1 200") && !status.starts_with("HTTP/1.0 200") {
        return None;
    }

    lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("location"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Multicasts one search and collects distinct description URLs until `wait` expires.
pub async fn search(wait: Duration) -> Result<Vec<String>> {
    let socket: UdpSocket = UdpSocket::bind("0.0.0.0:0").await?;
    let mx: u8 = wait.as_secs().clamp(1, 5) as u8;
    socket
        .send_to(&create_search_packet(IGD_SEARCH_TARGET, mx), SSDP_ADDR)
        .await?;

    let deadline: Instant = Instant::now() + wait;
    let mut locations: Vec<String> = Vec::new();
    let mut buf: [u8; MAX_UDP_DATAGRAM] = [0u8; MAX_UDP_DATAGRAM];

    while let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
        let (len, from) = received?;
        if let Some(location) = parse_location(&buf[..len])
            && !locations.contains(&location)
        {
            debug!("SSDP response from {from}: {location}");
            locations.push(location);
        }
    }

    Ok(locations)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
