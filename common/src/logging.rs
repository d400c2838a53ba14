// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Thin wrappers around `tracing`.
//!
//! Every event carries a `status` field which the daemon's formatter turns into
//! a coloured symbol. Background services log through these macros instead of
//! calling `tracing` directly so the status vocabulary stays in one place.
//!
//! An optional `verbosity = N` field hides the event unless the daemon was
//! started with at least `N` `-v` flags.

#[doc(hidden)]
#[macro_export]
macro_rules! __status_event {
    ($level:ident, $status:literal, $($arg:tt)+) => {
        tracing::$level!(status = $status, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::__status_event!(info, "info", $($arg)+)
    };
}

#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        $crate::__status_event!(info, "success", $($arg)+)
    };
}

/// State changes worth keeping in an operator's log (mappings, hosts, gateways).
#[macro_export]
macro_rules! audit {
    ($($arg:tt)+) => {
        $crate::__status_event!(info, "audit", $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::__status_event!(debug, "debug", $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::__status_event!(warn, "warn", $($arg)+)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::__status_event!(error, "error", $($arg)+)
    };
}
