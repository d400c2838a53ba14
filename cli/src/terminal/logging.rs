// Copyright (c) 2026 OverTheFlow and Contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// https://mozilla.org/MPL/2.0/.

//! Daemon log output: one line per event, led by a coloured status symbol.
//!
//! The `status` and `verbosity` fields set by the workspace's logging macros steer the
//! rendering and are not printed themselves. Every other field is appended as `key=value`.

use std::fmt::{self, Debug};

use colored::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info,natwarden=debug,mio=error,reqwest=warn";

pub fn init_logging(verbosity: u8) {
    let filter_layer: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .event_format(DaemonFormatter {
            max_verbosity: verbosity,
        })
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(formatting_layer)
        .init();
}

pub struct DaemonFormatter {
    pub max_verbosity: u8,
}

/// Everything the formatter needs from an event, gathered in one pass.
#[derive(Default)]
struct Collected {
    message: String,
    status: Option<String>,
    verbosity: u8,
    extra: Vec<(&'static str, String)>,
}

impl Visit for Collected {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "status" => self.status = Some(value.to_owned()),
            "message" => self.message = value.to_owned(),
            name => self.extra.push((name, value.to_owned())),
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match field.name() {
            "verbosity" => self.verbosity = u8::try_from(value).unwrap_or(u8::MAX),
            name => self.extra.push((name, value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        match field.name() {
            "verbosity" => self.verbosity = u8::try_from(value.max(0)).unwrap_or(u8::MAX),
            name => self.extra.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            name => self.extra.push((name, format!("{value:?}"))),
        }
    }
}

fn symbol(level: &Level, status: Option<&str>) -> ColoredString {
    match (*level, status) {
        (Level::ERROR, _) => "[-]".red().bold(),
        (Level::WARN, _) => "[*]".yellow().bold(),
        (Level::INFO, Some("info")) => "[»]".cyan().bold(),
        (Level::INFO, Some("audit")) => "[#]".magenta().bold(),
        (Level::INFO, _) => "[+]".green().bold(),
        (Level::DEBUG, _) => "[?]".blue(),
        (Level::TRACE, _) => "[ ]".dimmed(),
    }
}

impl<S, N> FormatEvent<S, N> for DaemonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields: Collected = Collected::default();
        event.record(&mut fields);

        if fields.verbosity > self.max_verbosity {
            return Ok(());
        }

        write!(
            writer,
            "{} {}",
            symbol(event.metadata().level(), fields.status.as_deref()),
            fields.message
        )?;
        for (name, value) in &fields.extra {
            write!(writer, " {}={value}", name.italic())?;
        }
        writeln!(writer)
    }
}
