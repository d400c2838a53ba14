// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::net::Ipv4Addr;

/// `d.c.b.a.in-addr.arpa` name used for reverse lookups.
pub fn reverse_address_to_ptr(ip_addr: &Ipv4Addr) -> String {
    let [a, b, c, d] = ip_addr.octets();
    format!("{d}.{c}.{b}.{a}.in-addr.arpa")
}

/// Addresses that can never be a LAN host: network/broadcast of `/0`, multicast, loopback.
pub fn is_scan_candidate(ip: &Ipv4Addr) -> bool {
    !(ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast() || ip.is_loopback())
}
