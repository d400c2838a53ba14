// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Pure reconciliation rules: no locks, no I/O, only the three views being compared.

use std::collections::HashMap;
use std::time::SystemTime;

use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::models::gateway::RawMapping;
use natwarden_common::models::host::NetworkHost;
use natwarden_common::models::mapping::{ManagedMapping, MappingId};

/// What the watchdog thinks of one raw device entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Correct and wanted.
    Keep,
    /// Description is not a mapping id; somebody else created it.
    Unmanaged,
    /// Carries an id that no managed mapping has anymore.
    Orphaned(MappingId),
    Disabled(MappingId),
    /// Protocol or ports no longer match the managed mapping.
    Stale(MappingId),
    Expired(MappingId),
    /// Nothing alive at the entry's private address.
    NoHost(MappingId),
    /// The private address now belongs to a different machine.
    WrongHost(MappingId),
}

impl Verdict {
    pub fn should_delete(&self, mode: BehaviourMode) -> bool {
        match self {
            Verdict::Keep => false,
            Verdict::Unmanaged => mode == BehaviourMode::Enforcing,
            _ => true,
        }
    }
}

pub fn classify(
    raw: &RawMapping,
    managed: &HashMap<MappingId, ManagedMapping>,
    hosts: &[NetworkHost],
    now: SystemTime,
) -> Verdict {
    let Some(id) = raw.correlation_id() else {
        return Verdict::Unmanaged;
    };
    let Some(wanted) = managed.get(&id) else {
        return Verdict::Orphaned(id);
    };

    if !wanted.enabled {
        return Verdict::Disabled(id);
    }
    if !raw.matches(wanted) {
        return Verdict::Stale(id);
    }
    if raw.is_expired(now) {
        return Verdict::Expired(id);
    }

    match hosts.iter().find(|host| host.ip == raw.private_ip) {
        None => Verdict::NoHost(id),
        Some(host) if host.mac != wanted.mac => Verdict::WrongHost(id),
        Some(_) => Verdict::Keep,
    }
}

/// Raw entries to create so that every enabled mapping with a live target is forwarded.
///
/// `existing` must be the device table as it stands after removals.
pub fn plan_creations<'a>(
    managed: impl IntoIterator<Item = &'a ManagedMapping>,
    hosts: &[NetworkHost],
    existing: &[RawMapping],
) -> Vec<RawMapping> {
    managed
        .into_iter()
        .filter(|wanted| wanted.enabled)
        .filter(|wanted| !existing.iter().any(|raw| raw.matches(wanted)))
        .filter_map(|wanted| {
            let host: &NetworkHost = hosts.iter().find(|host| host.mac == wanted.mac)?;
            Some(RawMapping::permanent(
                wanted.protocol,
                host.ip,
                wanted.private_port,
                wanted.public_port,
                wanted.id.to_string(),
            ))
        })
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
