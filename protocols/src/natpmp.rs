// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! NAT-PMP (RFC 6886) codec and a small retrying client.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout};

use natwarden_common::models::mapping::Protocol;

use crate::utils::{
    MAX_UDP_DATAGRAM, NATPMP_EXTERNAL_RESPONSE_LEN, NATPMP_MAP_REQUEST_LEN, NATPMP_MAP_RESPONSE_LEN,
    NATPMP_PORT,
};

const VERSION: u8 = 0;
const OP_EXTERNAL_ADDRESS: u8 = 0;
const OP_MAP_UDP: u8 = 1;
const OP_MAP_TCP: u8 = 2;
const OP_RESPONSE: u8 = 128;

const INITIAL_RETRY: Duration = Duration::from_millis(250);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NatPmpError {
    #[error("unsupported NAT-PMP version")]
    UnsupportedVersion,
    #[error("mapping refused by the gateway")]
    NotAuthorized,
    #[error("gateway has no external connectivity")]
    NetworkFailure,
    #[error("gateway is out of mapping resources")]
    OutOfResources,
    #[error("unsupported NAT-PMP opcode")]
    UnsupportedOpcode,
    #[error("unknown NAT-PMP result code {0}")]
    Unknown(u16),
}

impl NatPmpError {
    fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::UnsupportedVersion),
            2 => Some(Self::NotAuthorized),
            3 => Some(Self::NetworkFailure),
            4 => Some(Self::OutOfResources),
            5 => Some(Self::UnsupportedOpcode),
            other => Some(Self::Unknown(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalAddressResponse {
    pub epoch: u32,
    pub address: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapResponse {
    pub protocol: Protocol,
    pub epoch: u32,
    pub private_port: u16,
    pub public_port: u16,
    pub lifetime: u32,
}

fn map_opcode(protocol: Protocol) -> u8 {
    match protocol {
        Protocol::Udp => OP_MAP_UDP,
        Protocol::Tcp => OP_MAP_TCP,
    }
}

pub fn create_external_address_request() -> [u8; 2] {
    [VERSION, OP_EXTERNAL_ADDRESS]
}

/// A zero `lifetime` asks the gateway to delete the mapping.
pub fn create_map_request(
    protocol: Protocol,
    private_port: u16,
    public_port: u16,
    lifetime: u32,
) -> [u8; NATPMP_MAP_REQUEST_LEN] {
    let mut packet: [u8; NATPMP_MAP_REQUEST_LEN] = [0u8; NATPMP_MAP_REQUEST_LEN];
    packet[0] = VERSION;
    packet[1] = map_opcode(protocol);
    packet[4..6].copy_from_slice(&private_port.to_be_bytes());
    packet[6..8].copy_from_slice(&public_port.to_be_bytes());
    packet[8..12].copy_from_slice(&lifetime.to_be_bytes());
    packet
}

fn check_header(payload: &[u8], min_len: usize, opcode: u8) -> Result<()> {
    ensure!(payload.len() >= min_len, "NAT-PMP response too short ({} bytes)", payload.len());
    ensure!(payload[0] == VERSION, "NAT-PMP version {} not supported", payload[0]);
    ensure!(
        payload[1] == OP_RESPONSE + opcode,
        "unexpected NAT-PMP opcode {} (wanted {})",
        payload[1],
        OP_RESPONSE + opcode
    );

    if let Some(err) = NatPmpError::from_code(u16::from_be_bytes([payload[2], payload[3]])) {
        return Err(err.into());
    }
    Ok(())
}

fn read_u32(payload: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
}

pub fn parse_external_address_response(payload: &[u8]) -> Result<ExternalAddressResponse> {
    check_header(payload, NATPMP_EXTERNAL_RESPONSE_LEN, OP_EXTERNAL_ADDRESS)?;
    Ok(ExternalAddressResponse {
        epoch: read_u32(payload, 4),
        address: Ipv4Addr::new(payload[8], payload[9], payload[10], payload[11]),
    })
}

pub fn parse_map_response(payload: &[u8], protocol: Protocol) -> Result<MapResponse> {
    check_header(payload, NATPMP_MAP_RESPONSE_LEN, map_opcode(protocol))?;
    Ok(MapResponse {
        protocol,
        epoch: read_u32(payload, 4),
        private_port: u16::from_be_bytes([payload[8], payload[9]]),
        public_port: u16::from_be_bytes([payload[10], payload[11]]),
        lifetime: read_u32(payload, 12),
    })
}

/// Talks to the NAT-PMP server on one gateway.
///
/// Requests are retransmitted with a doubling interval starting at 250 ms until an answer
/// arrives or the overall `timeout` runs out.
#[derive(Debug, Clone, Copy)]
pub struct NatPmpClient {
    gateway: Ipv4Addr,
    timeout: Duration,
}

impl NatPmpClient {
    pub fn new(gateway: Ipv4Addr, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    async fn exchange(&self, request: &[u8], expected_opcode: u8) -> Result<Vec<u8>> {
        let socket: UdpSocket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(SocketAddrV4::new(self.gateway, NATPMP_PORT)).await?;

        let deadline: Instant = Instant::now() + self.timeout;
        let mut wait: Duration = INITIAL_RETRY;
        let mut buf: [u8; MAX_UDP_DATAGRAM] = [0u8; MAX_UDP_DATAGRAM];

        while Instant::now() < deadline {
            socket.send(request).await?;
            let window: Duration = wait.min(deadline.saturating_duration_since(Instant::now()));

            let window_end: Instant = Instant::now() + window;
            loop {
                let remaining: Duration = window_end.saturating_duration_since(Instant::now());
                let Ok(received) = timeout(remaining, socket.recv(&mut buf)).await else {
                    break;
                };
                let len: usize = received?;
                // Stray datagrams (e.g. address-change announcements) are skipped.
                if len >= 2 && buf[1] == OP_RESPONSE + expected_opcode {
                    return Ok(buf[..len].to_vec());
                }
            }
            wait *= 2;
        }

        bail!("NAT-PMP gateway {} did not answer within {:?}", self.gateway, self.timeout)
    }

    pub async fn external_address(&self) -> Result<ExternalAddressResponse> {
        let reply: Vec<u8> = self
            .exchange(&create_external_address_request(), OP_EXTERNAL_ADDRESS)
            .await?;
        parse_external_address_response(&reply)
    }

    pub async fn map(
        &self,
        protocol: Protocol,
        private_port: u16,
        public_port: u16,
        lifetime: u32,
    ) -> Result<MapResponse> {
        let request = create_map_request(protocol, private_port, public_port, lifetime);
        let reply: Vec<u8> = self.exchange(&request, map_opcode(protocol)).await?;
        parse_map_response(&reply, protocol)
    }

    /// Removes a mapping created from this host for `private_port`.
    pub async fn unmap(&self, protocol: Protocol, private_port: u16) -> Result<()> {
        self.map(protocol, private_port, 0, 0).await.map(|_| ())
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
