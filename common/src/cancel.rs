// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Cooperative cancellation for the long-running loops and their scan batches.
//!
//! A [`CancelHandle`] flips a `watch` flag once; every cloned [`CancelToken`] observes it.
//! Child tokens follow their parent, which lets a single discovery pass be cancelled
//! without touching the daemon-wide shutdown token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// A token that is never cancelled. Handy for one-shot calls and tests.
    pub fn never() -> Self {
        let (handle, token) = cancel_pair();
        std::mem::forget(handle);
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled or its handle is gone.
    pub async fn cancelled(&self) {
        let mut rx: watch::Receiver<bool> = self.rx.clone();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleeps for `period`, returning `false` early if cancelled in the meantime.
    pub async fn sleep(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(period) => !self.is_cancelled(),
        }
    }

    /// Creates a token cancelled by either its own handle or this token.
    pub fn child(&self) -> (CancelHandle, CancelToken) {
        let (handle, token) = cancel_pair();
        let parent: CancelToken = self.clone();
        let forward: Arc<watch::Sender<bool>> = handle.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {
                    forward.send_replace(true);
                }
                _ = forward.closed() => {}
            }
        });

        (handle, token)
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
