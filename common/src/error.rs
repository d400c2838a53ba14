// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Domain error taxonomy shared by the mapping store, identity directory and RPC facade.
//!
//! Each variant maps to a stable `(code, message)` pair that is safe to hand to a remote
//! caller. The `Display` output may carry more detail and is meant for logs only.

use std::sync::Arc;

use crate::error;

pub type NatResult<T> = Result<T, NatError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NatError {
    #[error("no identity attached to the session")]
    Unauthenticated,

    #[error("insufficient permissions")]
    Unauthorized,

    #[error("entry not found")]
    EntryNotFound,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("public port {0} is already taken")]
    PortUnavailable(u16),

    #[error("duplicate entry")]
    DuplicateEntry,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl NatError {
    pub const INTERNAL_CODE: i32 = -32100;

    pub fn code(&self) -> i32 {
        match self {
            NatError::Unauthenticated => 1000,
            NatError::Unauthorized => 1001,
            NatError::EntryNotFound => 1002,
            NatError::AccountDisabled => 1003,
            NatError::InvalidArgument(_) => 1004,
            NatError::PortUnavailable(_) => 1005,
            NatError::DuplicateEntry => 1006,
            NatError::Storage(_) => 1007,
            NatError::Internal(_) => Self::INTERNAL_CODE,
        }
    }

    /// Message handed to remote callers. Storage and internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            NatError::Unauthenticated => "Authentication is required to access this object.".into(),
            NatError::Unauthorized => "Insufficient permissions.".into(),
            NatError::EntryNotFound => "Object not found.".into(),
            NatError::AccountDisabled => "User's account is disabled.".into(),
            NatError::InvalidArgument(detail) => format!("Invalid argument: {detail}"),
            NatError::PortUnavailable(_) => "The specified port is already taken.".into(),
            NatError::DuplicateEntry => "Duplicate object already exists.".into(),
            NatError::Storage(_) => "A database error has occurred.".into(),
            NatError::Internal(_) => "Internal server error".into(),
        }
    }
}

impl From<anyhow::Error> for NatError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<NatError>() {
            Ok(nat) => nat,
            Err(other) => NatError::Internal(format!("{other:#}")),
        }
    }
}

/// Receives failures from background loops, where no caller is waiting for them.
pub trait ErrorSink: Send + Sync {
    fn report(&self, origin: &'static str, err: &anyhow::Error);
}

pub type SharedErrorSink = Arc<dyn ErrorSink>;

/// Default sink: every failure becomes an error log line tagged with its origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, origin: &'static str, err: &anyhow::Error) {
        error!(origin, "{err:#}");
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
