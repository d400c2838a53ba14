// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! 128-bit identifiers in the usual `8-4-4-4-12` hexadecimal text form.
//!
//! The text form matters: it is what the watchdog writes into a gateway mapping's
//! description field, and what it parses back to recognise its own entries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Guid(u128);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid identifier")]
pub struct GuidParseError(pub String);

impl Guid {
    pub const NIL: Guid = Guid(0);

    /// Random (version 4 layout) identifier.
    pub fn new_random() -> Self {
        let raw: u128 = rand::random::<u128>();
        let versioned: u128 = (raw & !(0xF << 76)) | (0x4 << 76);
        let variant: u128 = (versioned & !(0x3 << 62)) | (0x2 << 62);
        Guid(variant)
    }

    pub const fn from_u128(value: u128) -> Self {
        Guid(value)
    }

    pub const fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v: u128 = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Accepts the hyphenated form and the bare 32-digit form, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = || GuidParseError(s.to_string());
        let trimmed: &str = s.trim();

        let digits: String = match trimmed.len() {
            36 => {
                let groups: Vec<&str> = trimmed.split('-').collect();
                let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
                if lengths != [8, 4, 4, 4, 12] {
                    return Err(fail());
                }
                groups.concat()
            }
            32 => trimmed.to_string(),
            _ => return Err(fail()),
        };

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(fail());
        }

        u128::from_str_radix(&digits, 16).map(Guid).map_err(|_| fail())
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.to_string()
    }
}

impl TryFrom<String> for Guid {
    type Error = GuidParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
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
