// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use tokio::sync::RwLock;

use natwarden_common::config::{DynamicConfig, keys};
use natwarden_common::models::behaviour::BehaviourMode;
use natwarden_common::{info, warn};

/// Process-wide enforcement policy, read by the watchdog on every tick.
pub struct BehaviourPolicy {
    config: DynamicConfig,
    mode: RwLock<BehaviourMode>,
}

impl BehaviourPolicy {
    /// Reads the stored mode, writing the default into configuration if none is stored yet.
    ///
    /// An unrecognised stored value falls back to `Enforcing`.
    pub fn load(config: DynamicConfig) -> anyhow::Result<Self> {
        let stored: u32 = config.read(&keys::DAEMON_BEHAVIOUR_MODE)?;
        let mode: BehaviourMode = BehaviourMode::from_config_value(stored).unwrap_or_else(|| {
            warn!("Unknown behaviour mode {stored} in configuration, using enforcing");
            BehaviourMode::Enforcing
        });

        info!("Daemon starts in {mode} mode");
        Ok(Self {
            config,
            mode: RwLock::new(mode),
        })
    }

    pub async fn mode(&self) -> BehaviourMode {
        *self.mode.read().await
    }

    /// Switches mode; `permanent` also writes it to configuration so it survives a restart.
    pub async fn set(&self, mode: BehaviourMode, permanent: bool) -> anyhow::Result<()> {
        if permanent {
            self.config
                .set(keys::DAEMON_BEHAVIOUR_MODE.name, &mode.as_config_value())?;
        }
        *self.mode.write().await = mode;
        Ok(())
    }
}
