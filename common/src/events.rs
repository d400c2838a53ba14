// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Fan-out event publishing.
//!
//! Publishers own a `broadcast` sender; subscribers get their own receiver and handle
//! events on a dedicated task, so no subscriber code ever runs while a publisher holds
//! one of its locks.

use std::future::Future;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::warn;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct Publisher<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> Publisher<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers received the event. Zero is not an error.
    pub fn publish(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl<T: Clone + Send + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives `handler` for every event on `rx` until `cancel` fires or the publisher goes away.
pub fn spawn_listener<T, F, Fut>(
    name: &'static str,
    mut rx: broadcast::Receiver<T>,
    cancel: CancelToken,
    mut handler: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => handler(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(listener = name, "Listener fell behind, {skipped} events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

/// Like [`spawn_listener`], for subscribers that mirror the publisher's state.
///
/// When the receiver falls behind, the backlog is abandoned: the listener re-subscribes at the
/// live end of the channel and runs `resync`, which rebuilds the mirror from the owner's
/// current snapshot. Events published after the re-subscription are delivered as usual.
pub fn spawn_mirroring_listener<T, F, Fut, R, RFut>(
    name: &'static str,
    mut rx: broadcast::Receiver<T>,
    cancel: CancelToken,
    mut handler: F,
    mut resync: R,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
    R: FnMut() -> RFut + Send + 'static,
    RFut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => handler(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(listener = name, "Listener fell behind by {skipped} events, resyncing");
                        rx = rx.resubscribe();
                        resync().await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
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
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;
    use crate::cancel::cancel_pair;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let publisher: Publisher<u32> = Publisher::new();
        assert_eq!(publisher.publish(7), 0);
    }

    #[tokio::test]
    async fn listener_sees_events_in_order() {
        let publisher: Publisher<u32> = Publisher::new();
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let (handle, token) = cancel_pair();

        let sink = seen.clone();
        let task = spawn_listener("test", publisher.subscribe(), token, move |n| {
            let sink = sink.clone();
            async move { sink.lock().await.push(n) }
        });

        for n in 1..=3 {
            publisher.publish(n);
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.lock().await.len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("events should arrive");

        handle.cancel();
        task.await.unwrap();
        assert_eq!(*seen.lock().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn lagging_mirror_resyncs_and_keeps_listening() {
        let publisher: Publisher<u32> = Publisher::with_capacity(4);
        let rx = publisher.subscribe();
        let resyncs: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        for n in 0..16 {
            publisher.publish(n);
        }

        let (handle, token) = cancel_pair();
        let sink = seen.clone();
        let counter = resyncs.clone();
        let task = spawn_mirroring_listener(
            "test",
            rx,
            token,
            move |n| {
                let sink = sink.clone();
                async move { sink.lock().await.push(n) }
            },
            move || {
                let counter = counter.clone();
                async move { *counter.lock().await += 1 }
            },
        );

        tokio::time::timeout(Duration::from_secs(1), async {
            while *resyncs.lock().await == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("lag should trigger a resync");

        publisher.publish(100);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !seen.lock().await.contains(&100) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("events after the resync should arrive");

        handle.cancel();
        task.await.unwrap();
        assert_eq!(*resyncs.lock().await, 1);
        assert_eq!(*seen.lock().await, vec![100]);
    }

    #[tokio::test]
    async fn listener_stops_when_publisher_dropped() {
        let publisher: Publisher<u32> = Publisher::new();
        let rx = publisher.subscribe();
        let task = spawn_listener("test", rx, CancelToken::never(), |_| async {});
        drop(publisher);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("listener should exit")
            .unwrap();
    }
}
