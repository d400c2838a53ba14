// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! # Command Line Interface Definitions
//!
//! Argument schema of `natwardend`. Execution of each command lives in its own submodule.

pub mod defaults;
pub mod run;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "natwardend")]
#[command(about = "Keeps a NAT gateway's port forwards in line with the declared mappings.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging detail (-v: scan and discovery chatter, -vv: every host event)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbosity: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon until interrupted
    #[command(alias = "r")]
    Run {
        /// Launch settings file
        #[arg(short = 'c', long = "config", default_value = "natwarden.toml")]
        config: PathBuf,
    },

    /// List the runtime configuration keys and their defaults
    #[command(alias = "d")]
    Defaults,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
