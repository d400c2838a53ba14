// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Local interface inspection.
//!
//! The host mapper needs two facts about the interface facing the gateway: its prefix length
//! (to derive the subnet to sweep) and its own MAC (the local host cannot ARP itself).

use std::net::Ipv4Addr;

use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::IpNetwork;
use pnet::util::MacAddr;

use crate::debug;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    /// Loopback never faces a gateway.
    IsLoopback,
    /// The interface does not have a MAC address.
    NoMacAddress,
    /// The interface is a point-to-point link (e.g., a VPN).
    IsPointToPoint,
    /// The interface carries no IPv4 address.
    NoIpv4,
}

/// The slice of a [`NetworkInterface`] the daemon cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub prefix: u8,
    pub mac: MacAddr,
}

/// Interface that owns `ip` as one of its own addresses.
pub fn interface_with_address(ip: Ipv4Addr) -> Option<LocalInterface> {
    select_owner(&pnet::datalink::interfaces(), ip)
}

/// Interface whose subnet contains `ip`, e.g. the one facing a given gateway.
pub fn interface_facing(ip: Ipv4Addr) -> Option<LocalInterface> {
    select_facing(&pnet::datalink::interfaces(), ip)
}

fn is_viable(interface: &NetworkInterface) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    if interface.is_point_to_point() {
        return Err(ViabilityError::IsPointToPoint);
    }
    if interface.mac.is_none() {
        return Err(ViabilityError::NoMacAddress);
    }
    if !interface.ips.iter().any(IpNetwork::is_ipv4) {
        return Err(ViabilityError::NoIpv4);
    }
    Ok(())
}

fn viable(interfaces: &[NetworkInterface]) -> impl Iterator<Item = &NetworkInterface> {
    interfaces.iter().filter(|intf| match is_viable(intf) {
        Ok(()) => true,
        Err(reason) => {
            debug!(verbosity = 2, "Skipping interface {}: {reason:?}", intf.name);
            false
        }
    })
}

fn select_owner(interfaces: &[NetworkInterface], ip: Ipv4Addr) -> Option<LocalInterface> {
    viable(interfaces).find_map(|intf| {
        intf.ips.iter().find_map(|net| match net {
            IpNetwork::V4(v4) if v4.ip() == ip => Some(LocalInterface {
                name: intf.name.clone(),
                ip,
                prefix: v4.prefix(),
                mac: intf.mac?,
            }),
            _ => None,
        })
    })
}

fn select_facing(interfaces: &[NetworkInterface], ip: Ipv4Addr) -> Option<LocalInterface> {
    viable(interfaces).find_map(|intf| {
        intf.ips.iter().find_map(|net| match net {
            IpNetwork::V4(v4) if v4.contains(ip) => Some(LocalInterface {
                name: intf.name.clone(),
                ip: v4.ip(),
                prefix: v4.prefix(),
                mac: intf.mac?,
            }),
            _ => None,
        })
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::ipnetwork::IpNetwork;

    const IFF_UP: u32 = 1;
    const IFF_BROADCAST: u32 = 1 << 1;
    const IFF_LOOPBACK: u32 = 1 << 3;
    const IFF_POINTTOPOINT: u32 = 1 << 4;

    fn create_mock_interface(
        name: &str,
        mac: Option<MacAddr>,
        ips: Vec<IpNetwork>,
        flags: u32,
    ) -> NetworkInterface {
        NetworkInterface {
            name: name.to_string(),
            description: "An interface".to_string(),
            index: 0,
            mac,
            ips,
            flags,
        }
    }

    fn lan_mac() -> Option<MacAddr> {
        Some(MacAddr(0x1, 0x2, 0x3, 0x4, 0x5, 0x6))
    }

    fn lan_interface() -> NetworkInterface {
        create_mock_interface(
            "eth0",
            lan_mac(),
            vec![IpNetwork::V4("192.168.1.100/24".parse().unwrap())],
            IFF_UP | IFF_BROADCAST,
        )
    }

    #[test]
    fn owner_lookup_returns_prefix_and_mac() {
        let found: LocalInterface =
            select_owner(&[lan_interface()], Ipv4Addr::new(192, 168, 1, 100)).unwrap();
        assert_eq!(found.name, "eth0");
        assert_eq!(found.prefix, 24);
        assert_eq!(Some(found.mac), lan_mac());
    }

    #[test]
    fn owner_lookup_ignores_other_addresses_in_subnet() {
        assert_eq!(select_owner(&[lan_interface()], Ipv4Addr::new(192, 168, 1, 1)), None);
    }

    #[test]
    fn facing_lookup_finds_gateway_side() {
        let vpn: NetworkInterface = create_mock_interface(
            "tun0",
            None,
            vec![IpNetwork::V4("10.8.0.2/24".parse().unwrap())],
            IFF_UP | IFF_POINTTOPOINT,
        );
        let found: LocalInterface =
            select_facing(&[vpn, lan_interface()], Ipv4Addr::new(192, 168, 1, 1)).unwrap();
        assert_eq!(found.ip, Ipv4Addr::new(192, 168, 1, 100));
    }

    #[test]
    fn down_interface_is_not_viable() {
        let down: NetworkInterface = create_mock_interface(
            "eth0",
            lan_mac(),
            vec![IpNetwork::V4("192.168.1.100/24".parse().unwrap())],
            IFF_BROADCAST,
        );
        assert_eq!(is_viable(&down), Err(ViabilityError::IsDown));
    }

    #[test]
    fn loopback_is_not_viable() {
        let lo: NetworkInterface = create_mock_interface(
            "lo",
            lan_mac(),
            vec![IpNetwork::V4("127.0.0.1/8".parse().unwrap())],
            IFF_UP | IFF_LOOPBACK,
        );
        assert_eq!(is_viable(&lo), Err(ViabilityError::IsLoopback));
    }

    #[test]
    fn ipv6_only_is_not_viable() {
        let v6: NetworkInterface = create_mock_interface(
            "eth1",
            lan_mac(),
            vec![IpNetwork::V6("fe80::1/64".parse().unwrap())],
            IFF_UP | IFF_BROADCAST,
        );
        assert_eq!(is_viable(&v6), Err(ViabilityError::NoIpv4));
    }

    #[test]
    fn missing_mac_is_not_viable() {
        let no_mac: NetworkInterface = create_mock_interface(
            "eth2",
            None,
            vec![IpNetwork::V4("192.168.1.100/24".parse().unwrap())],
            IFF_UP | IFF_BROADCAST,
        );
        assert_eq!(is_viable(&no_mac), Err(ViabilityError::NoMacAddress));
    }
}
