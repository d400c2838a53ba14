// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

#![cfg(test)]
use natwarden_common::config::{keys, DynamicConfig};
use natwarden_common::error::NatError;
use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::models::identity::{Permissions, UserId, UserInfo};
use natwarden_common::models::mapping::{ManagedMapping, Protocol};
use natwarden_core::behaviour::BehaviourPolicy;
use natwarden_core::mapping::NewMapping;

use crate::support::{forward_request, Harness};

#[tokio::test]
async fn enabled_mappings_never_share_a_port() {
    let h: Harness = Harness::new().await.unwrap();
    h.forward(9000).await.unwrap();

    let clash = h.store.create(h.admin, forward_request(h.admin, 9000)).await;
    assert_eq!(clash, Err(NatError::PortUnavailable(9000)));

    let udp: NewMapping = NewMapping {
        protocol: Protocol::Udp,
        ..forward_request(h.admin, 9000)
    };
    assert!(h.store.create(h.admin, udp).await.is_ok());

    let parked: NewMapping = NewMapping {
        enabled: false,
        ..forward_request(h.admin, 9000)
    };
    let parked: ManagedMapping = h.store.create(h.admin, parked).await.unwrap();
    assert_eq!(
        h.store.set_enabled(h.admin, parked.id, true).await,
        Err(NatError::PortUnavailable(9000))
    );
}

#[tokio::test]
async fn strangers_cannot_touch_mappings() {
    let h: Harness = Harness::new().await.unwrap();
    let eve: UserId = UserId::new_random();
    h.identities
        .add(UserInfo::new(eve, Permissions::STANDARD))
        .await
        .unwrap();
    let mapping: ManagedMapping = h.forward(9000).await.unwrap();

    assert_eq!(h.store.delete(eve, mapping.id).await, Err(NatError::Unauthorized));
    assert_eq!(h.store.get_by_id(eve, mapping.id).await, Err(NatError::Unauthorized));
    assert_eq!(
        h.store.set_owner(eve, mapping.id, eve).await,
        Err(NatError::Unauthorized)
    );
    assert_eq!(h.store.get_all(eve).await, Err(NatError::Unauthorized));
}

#[tokio::test]
async fn disabled_account_is_refused() {
    let h: Harness = Harness::new().await.unwrap();
    let carol: UserId = UserId::new_random();
    h.identities
        .add(UserInfo::new(carol, Permissions::ADMINISTRATOR))
        .await
        .unwrap();
    h.identities.set_enabled(carol, false).await.unwrap();

    assert_eq!(
        h.store.create(carol, forward_request(carol, 9000)).await,
        Err(NatError::AccountDisabled)
    );
}

#[tokio::test]
async fn short_mac_is_invalid() {
    let h: Harness = Harness::new().await.unwrap();
    let request: NewMapping = NewMapping {
        mac: vec![0xAA, 0xBB, 0xCC],
        ..forward_request(h.admin, 9000)
    };

    match h.store.create(h.admin, request).await {
        Err(NatError::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

#[tokio::test]
async fn first_read_persists_enforcing_default() {
    let config: DynamicConfig = DynamicConfig::in_memory();
    assert!(!config.contains(keys::DAEMON_BEHAVIOUR_MODE.name).unwrap());

    let policy: BehaviourPolicy = BehaviourPolicy::load(config.clone()).unwrap();

    assert_eq!(policy.mode().await, BehaviourMode::Enforcing);
    assert!(config.contains(keys::DAEMON_BEHAVIOUR_MODE.name).unwrap());
    assert_eq!(config.get::<u32>(keys::DAEMON_BEHAVIOUR_MODE.name).unwrap(), Some(0));
}
