// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use natwarden_common::cancel::CancelToken;
use natwarden_common::error;

/// Runs `work` for every item with at most `parallelism` futures in flight and collects the
/// `Some` results in completion order.
///
/// Once `cancel` fires no new item is started and in-flight items resolve to `None`.
pub async fn for_each_bounded<I, T, R, F, Fut>(
    items: I,
    parallelism: usize,
    cancel: &CancelToken,
    work: F,
) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Option<R>> + Send + 'static,
{
    let semaphore: Arc<Semaphore> = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut set: JoinSet<Option<R>> = JoinSet::new();

    for item in items {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_closed) => break,
            },
        };

        let task = work(item);
        let cancel: CancelToken = cancel.clone();
        set.spawn(async move {
            let _permit = permit;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                out = task => out,
            }
        });
    }

    let mut results: Vec<R> = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => error!("Scan task failed: {e}"),
        }
    }
    results
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
