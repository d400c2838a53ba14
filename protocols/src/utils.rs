// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::net::{Ipv4Addr, SocketAddrV4};

// Application Layer
pub const DNS_HDR_LEN: usize = 12;
pub const MAX_UDP_DATAGRAM: usize = 1500;

// SSDP
pub const SSDP_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900);

// NAT-PMP (RFC 6886)
pub const NATPMP_PORT: u16 = 5351;
pub const NATPMP_EXTERNAL_RESPONSE_LEN: usize = 12;
pub const NATPMP_MAP_REQUEST_LEN: usize = 12;
pub const NATPMP_MAP_RESPONSE_LEN: usize = 16;

// Kernel tables
pub const PROC_NET_ARP: &str = "/proc/net/arp";
pub const PROC_NET_ROUTE: &str = "/proc/net/route";
