// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! **Medium Access Control (MAC)** address helpers.
//!
//! Covers validation of caller-supplied addresses, the text form used on the wire and
//! the **Organizationally unique identifier (OUI)** vendor lookup.

use std::sync::OnceLock;

use mac_oui::Oui;
use pnet::util::MacAddr;

use crate::warn;

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn get_oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("OUI database unavailable, vendors will not be resolved: {e}");
                None
            }
        })
        .as_ref()
}

/// Identify the vendor of a MAC address.
pub fn get_vendor(mac: MacAddr) -> Option<String> {
    let db: &Oui = get_oui_db()?;
    match db.lookup_by_mac(&mac.to_string()) {
        Ok(Some(entry)) => Some(entry.company_name.clone()),
        _ => None,
    }
}

/// Builds a MAC from raw bytes, which must be exactly six long.
pub fn from_bytes(bytes: &[u8]) -> Option<MacAddr> {
    match bytes {
        [a, b, c, d, e, f] => Some(MacAddr::new(*a, *b, *c, *d, *e, *f)),
        _ => None,
    }
}

pub fn to_bytes(mac: MacAddr) -> [u8; 6] {
    [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]
}

/// Parses `aa:bb:cc:dd:ee:ff`, `AA-BB-CC-DD-EE-FF` or the bare `AABBCCDDEEFF` form.
pub fn parse(text: &str) -> Option<MacAddr> {
    let hex: String = text
        .trim()
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect();

    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let bytes: Vec<u8> = (0..6)
        .map(|i| u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16))
        .collect::<Result<_, _>>()
        .ok()?;

    from_bytes(&bytes)
}

/// Serde adapter storing a [`MacAddr`] as its colon separated text form.
pub mod serde_text {
    use pnet::util::MacAddr;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&mac.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MacAddr, D::Error> {
        let text: String = String::deserialize(deserializer)?;
        super::parse(&text).ok_or_else(|| D::Error::custom(format!("invalid MAC address '{text}'")))
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
