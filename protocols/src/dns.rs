// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Reverse (PTR) lookups against a single resolver.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use dns_parser::{Builder, Packet, QueryClass, QueryType, RData};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use natwarden_common::utils::ip;

use crate::utils::{DNS_HDR_LEN, MAX_UDP_DATAGRAM};

/// Constructs a raw DNS query packet for a PTR lookup.
pub fn create_ptr_packet(ip_addr: &Ipv4Addr, id: u16) -> Result<Vec<u8>> {
    let ptr_name: String = ip::reverse_address_to_ptr(ip_addr);

    let mut builder: Builder = Builder::new_query(id, true);
    builder.add_question(&ptr_name, false, QueryType::PTR, QueryClass::IN);

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build DNS packet: {:?}", e))
}

/// Extracts the first PTR answer of a response to query `id`.
///
/// A well-formed answer without PTR records (e.g. NXDOMAIN) is `Ok(None)`.
pub fn parse_ptr_response(payload: &[u8], id: u16) -> Result<Option<String>> {
    ensure!(payload.len() >= DNS_HDR_LEN, "DNS response too short ({} bytes)", payload.len());
    let packet: Packet = Packet::parse(payload).context("Failed to parse DNS packet")?;
    ensure!(packet.header.id == id, "DNS response id {} does not match query {id}", packet.header.id);

    let hostname: Option<String> = packet.answers.iter().find_map(|record| match &record.data {
        RData::PTR(ptr) => Some(ptr.0.to_string()),
        _ => None,
    });
    Ok(hostname)
}

/// Sends one PTR query for `ip` to `server` and waits up to `wait` for the answer.
pub async fn reverse_lookup(
    server: SocketAddr,
    ip: Ipv4Addr,
    wait: Duration,
) -> Result<Option<String>> {
    let bind_addr: &str = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket: UdpSocket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server).await?;

    let id: u16 = rand::random::<u16>();
    socket.send(&create_ptr_packet(&ip, id)?).await?;

    let mut buf: [u8; MAX_UDP_DATAGRAM] = [0u8; MAX_UDP_DATAGRAM];
    let received: usize = match timeout(wait, socket.recv(&mut buf)).await {
        Ok(result) => result?,
        Err(_elapsed) => return Ok(None),
    };

    parse_ptr_response(&buf[..received], id)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
