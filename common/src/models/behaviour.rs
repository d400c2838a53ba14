// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the watchdog treats gateway mappings it did not create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviourMode {
    /// Unmanaged mappings are deleted.
    #[default]
    Enforcing,
    /// Unmanaged mappings are left alone.
    Permissive,
}

impl BehaviourMode {
    /// Integer form stored in the dynamic configuration.
    pub fn as_config_value(&self) -> u32 {
        match self {
            BehaviourMode::Enforcing => 0,
            BehaviourMode::Permissive => 1,
        }
    }

    pub fn from_config_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(BehaviourMode::Enforcing),
            1 => Some(BehaviourMode::Permissive),
            _ => None,
        }
    }
}

impl fmt::Display for BehaviourMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviourMode::Enforcing => write!(f, "enforcing"),
            BehaviourMode::Permissive => write!(f, "permissive"),
        }
    }
}

impl FromStr for BehaviourMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enforcing" => Ok(BehaviourMode::Enforcing),
            "permissive" => Ok(BehaviourMode::Permissive),
            other => Err(format!("unknown behaviour mode '{other}'")),
        }
    }
}
