// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::guid::{Guid, GuidParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Guid);

impl UserId {
    pub fn new_random() -> Self {
        UserId(Guid::new_random())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = GuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UserId)
    }
}

/// Permission bitset of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u32);

impl Permissions {
    pub const STANDARD: Permissions = Permissions(0);
    pub const MANAGE_USERS: Permissions = Permissions(1);
    pub const MANAGE_MAPPINGS: Permissions = Permissions(2);
    pub const MANAGE_SETTINGS: Permissions = Permissions(4);
    pub const MANAGE_DAEMON: Permissions = Permissions(8);
    pub const MANAGE_NETWORK: Permissions = Permissions(16);
    pub const ADMINISTRATOR: Permissions = Permissions(31);

    pub const fn from_bits(bits: u32) -> Self {
        Permissions(bits & Self::ADMINISTRATOR.0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

/// What the identity directory knows about a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub permissions: Permissions,
    pub enabled: bool,
}

impl UserInfo {
    pub fn new(id: UserId, permissions: Permissions) -> Self {
        Self {
            id,
            permissions,
            enabled: true,
        }
    }

    pub fn can(&self, permission: Permissions) -> bool {
        self.permissions.contains(permission)
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
