//! CLI for remote circuit-simulation engines.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod analyze;
mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use simwire::{SessionConfig, SimulationSession};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simwire", version, about = "Drive a remote circuit-simulation engine")]
struct Cli {
    /// Engine address (host:port). Overrides the config file.
    #[arg(long, short = 'a', global = true)]
    address: Option<String>,

    /// Path to a JSON session config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a transient analysis.
    Tran(analyze::TranArgs),

    /// Run a small-signal AC sweep.
    Ac(analyze::AcArgs),

    /// Compute the DC operating point.
    Op(analyze::OpArgs),

    /// Check that the engine answers.
    Ping,

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("simwire: {e:#}");
        std::process::exit(1);
    }
}

/// Logs to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        let config = || resolve_config(self.config.as_deref(), self.address.clone());
        match self.command {
            Command::Tran(args) => args.run(&config()?),
            Command::Ac(args) => args.run(&config()?),
            Command::Op(args) => args.run(&config()?),
            Command::Ping => ping(&config()?),
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "simwire", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

fn ping(config: &SessionConfig) -> Result<()> {
    let session = SimulationSession::open_with(config.clone())?;
    session.ping()?;
    println!("{}: ok", config.address);
    Ok(())
}

/// Picks the session config: `--config`, else the user config file if it
/// exists, else defaults. `--address` overrides whichever was chosen.
fn resolve_config(explicit: Option<&Path>, address: Option<String>) -> Result<SessionConfig> {
    let mut config = match explicit {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => SessionConfig::load(&path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => SessionConfig::default(),
        },
    };
    if let Some(address) = address {
        config = config.address(address);
    }
    Ok(config)
}

/// `$CONFIG_DIR/simwire/config.json`.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("simwire").join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn address_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "address": "lab:6000", "poll_interval_ms": 50 }"#).unwrap();

        let cfg = resolve_config(Some(&path), None).unwrap();
        assert_eq!(cfg.address, "lab:6000");
        assert_eq!(cfg.poll_interval_ms, 50);

        let cfg = resolve_config(Some(&path), Some("127.0.0.1:7000".into())).unwrap();
        assert_eq!(cfg.address, "127.0.0.1:7000");
        assert_eq!(cfg.poll_interval_ms, 50);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_config(Some(&dir.path().join("nope.json")), None).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[test]
    fn parses_analysis_commands() {
        let cli = Cli::try_parse_from([
            "simwire", "-vv", "--address", "h:1", "ac", "--sweep", "oct", "--points", "5",
            "--fstart", "10", "--fstop", "1e4", "--save", "V(2)", "rc.sp",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.address.as_deref(), Some("h:1"));
        assert!(matches!(cli.command, Command::Ac(_)));
    }
}
