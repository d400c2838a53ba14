// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Every dynamic configuration key the daemon reads, with its default.

/// A typed configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigKey<T> {
    pub name: &'static str,
    pub default: T,
}

impl<T> ConfigKey<T> {
    pub const fn new(name: &'static str, default: T) -> Self {
        Self { name, default }
    }
}

/// Gateway liveness check and rediscovery interval (ms).
pub const GATEWAY_HEARTBEAT_FREQUENCY: ConfigKey<u64> =
    ConfigKey::new("natwarden.gateway.heartbeatFrequency", 3_000);

/// Upper bound for a single gateway discovery attempt (ms).
pub const GATEWAY_DISCOVERY_TIMEOUT: ConfigKey<u64> =
    ConfigKey::new("natwarden.gateway.discoveryTimeout", 5_000);

/// Interval between liveness re-checks of known hosts (ms).
pub const NETWORK_HEARTBEAT_FREQUENCY: ConfigKey<u64> =
    ConfigKey::new("natwarden.network.heartbeatFrequency", 10_000);

/// Interval between subnet sweeps (ms).
pub const NETWORK_DISCOVERY_FREQUENCY: ConfigKey<u64> =
    ConfigKey::new("natwarden.network.discoveryFrequency", 30_000);

/// How many hosts are scanned at once.
pub const NETWORK_DEGREE_OF_PARALLELISM: ConfigKey<u64> =
    ConfigKey::new("natwarden.network.degreeOfParallelism", 30);

/// Reconciliation tick (ms).
pub const WATCHDOG_UPDATE_FREQUENCY: ConfigKey<u64> =
    ConfigKey::new("natwarden.watchdog.updateFrequency", 10_000);

/// 0 = enforcing, 1 = permissive.
pub const DAEMON_BEHAVIOUR_MODE: ConfigKey<u32> =
    ConfigKey::new("natwarden.daemon.behaviourMode", 0);

/// Name and default of every key, in display order.
pub fn all() -> Vec<(&'static str, u64)> {
    let millis: [ConfigKey<u64>; 6] = [
        GATEWAY_HEARTBEAT_FREQUENCY,
        GATEWAY_DISCOVERY_TIMEOUT,
        NETWORK_HEARTBEAT_FREQUENCY,
        NETWORK_DISCOVERY_FREQUENCY,
        NETWORK_DEGREE_OF_PARALLELISM,
        WATCHDOG_UPDATE_FREQUENCY,
    ];

    let mut entries: Vec<(&'static str, u64)> =
        millis.iter().map(|key| (key.name, key.default)).collect();
    entries.push((DAEMON_BEHAVIOUR_MODE.name, u64::from(DAEMON_BEHAVIOUR_MODE.default)));
    entries
}
