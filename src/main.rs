//! # scxml
//!
//! Command-line client for a remote SCXML execution service: manage
//! definitions and instances, follow their changes, and watch a live diagram.

#![deny(unsafe_code)]

mod commands;
mod watch;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use scxml_settings::ClientSettings;

use crate::commands::Command;

/// SCXML service client.
#[derive(Parser, Debug)]
#[command(name = "scxml", about = "Client for a remote SCXML execution service", version)]
struct Cli {
    /// Service host, e.g. `http://localhost:8002` (overrides settings).
    #[arg(short = 'H', long, global = true)]
    host: Option<String>,

    /// Log filter for stderr diagnostics (overrides settings; `RUST_LOG` wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut ClientSettings) {
        if let Some(host) = &self.host {
            settings.api.host.clone_from(host);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut settings = scxml_settings::load_settings().context("Failed to load settings")?;
    cli.apply_overrides(&mut settings);
    settings.validate()?;

    scxml_core::logging::init_subscriber(&settings.logging.level);
    tracing::debug!(api = %settings.api_url(), command = ?cli.command, "starting");

    cli.command.execute(&settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["scxml", "ls", "-H", "http://remote:9000", "--log-level", "debug"]).unwrap();
        let mut settings = ClientSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.api_url(), "http://remote:9000/api/v1");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = Cli::try_parse_from(["scxml", "subscribe", "chart1"]).unwrap();
        let mut settings = ClientSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["scxml"]).is_err());
    }
}
