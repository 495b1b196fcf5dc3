//! Engine CLI.
//!
//! There is no interactive surface: each subcommand is one trigger the
//! host's scheduler fires (path unit for `drain`, timers for `egress` and
//! `sweep`, boot for `setup`). Observable behavior is the filesystem
//! layout plus stderr logs.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use engine::io::config::load_config;
use engine::io::executor::ClaudeExecutor;
use engine::io::git::DivergedError;
use engine::io::nft::NftFirewall;
use engine::io::notify::WebhookNotifier;
use engine::io::resolve::SystemResolver;
use engine::{drain, egress, exit_codes, logging, setup, sweep};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "engine", version, about = "File-inbox task execution engine")]
struct Cli {
    /// Path to the engine configuration file.
    #[arg(long, global = true, default_value = "/etc/engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Materialize secrets, prepare the workspace, install static egress sets.
    Setup,
    /// Process queued tasks, oldest first, until the inbox is empty.
    Drain,
    /// Refresh the dynamic egress address sets from DNS.
    Egress,
    /// Delete aged completed/failed/stranded task artifacts.
    Sweep,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        let code = if err.downcast_ref::<DivergedError>().is_some() {
            exit_codes::DIVERGED
        } else {
            exit_codes::INVALID
        };
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Setup => setup::run_setup(&config, &NftFirewall),
        Command::Drain => {
            let executor = ClaudeExecutor::from_config(&config);
            let notifier = WebhookNotifier::new(config.webhook_url.clone(), WEBHOOK_TIMEOUT)?;
            drain::run_drain(&config, &executor, &notifier)?;
            Ok(())
        }
        Command::Egress => {
            egress::run_egress_cycle(&config, &SystemResolver, &NftFirewall)?;
            Ok(())
        }
        Command::Sweep => {
            sweep::run_sweep(&config)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_drain() {
        let cli = Cli::parse_from(["engine", "drain"]);
        assert!(matches!(cli.command, Command::Drain));
        assert_eq!(cli.config, PathBuf::from("/etc/engine.toml"));
    }

    #[test]
    fn parse_config_override() {
        let cli = Cli::parse_from(["engine", "--config", "/tmp/e.toml", "sweep"]);
        assert!(matches!(cli.command, Command::Sweep));
        assert_eq!(cli.config, PathBuf::from("/tmp/e.toml"));
    }
}
