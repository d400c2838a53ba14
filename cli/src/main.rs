// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # natwardend
//!
//! Entry point of the daemon binary. Parses arguments, installs the log formatter and
//! dispatches to the selected command. Any error that reaches this level is logged and turned
//! into a non-zero exit code.

mod commands;
mod settings;
mod terminal;

use std::process::ExitCode;

use natwarden_common::error;

use crate::commands::{CommandLine, Commands, defaults, run};

#[tokio::main]
async fn main() -> ExitCode {
    let commands: CommandLine = CommandLine::parse_args();
    terminal::logging::init_logging(commands.verbosity);

    let result: anyhow::Result<()> = match &commands.command {
        Commands::Run { config } => run::run(config).await,
        Commands::Defaults => defaults::defaults(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Critical failure: {e:#}");
            ExitCode::FAILURE
        }
    }
}
