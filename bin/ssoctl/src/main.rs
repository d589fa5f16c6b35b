//! ---
//! sso_section: "04-operator-tooling"
//! sso_subsection: "binary"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Control CLI for operators of the SSO gate."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sso_common::config::{LoadedSsoConfig, LoggingConfig, SsoConfig};
use sso_logging as logging;
use tracing::warn;

mod check;
mod config_cmd;
mod token;

/// Locations probed when neither `--config` nor `SSO_GATE_CONFIG` is set.
const DEFAULT_CONFIG_CANDIDATES: &[&str] = &[
    "sso.toml",
    "configs/sso.toml",
    "/etc/sso-gate/sso.toml",
];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "SSO gate operator utility",
    long_about = None
)]
struct Cli {
    /// Configuration file; overrides SSO_GATE_CONFIG and the default locations.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(subcommand, about = "Configuration actions")]
    Config(config_cmd::ConfigCommand),
    #[command(subcommand, about = "Token verification and permission lookups")]
    Token(token::TokenCommand),
    #[command(about = "Decide whether a token holds permissions in a module")]
    Check(check::CheckCommand),
}

/// Resolve the configuration from an explicit path or the usual locations.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<LoadedSsoConfig> {
    match explicit {
        Some(path) => Ok(LoadedSsoConfig {
            config: SsoConfig::from_path(path)?,
            source: path.to_path_buf(),
        }),
        None => SsoConfig::load_with_source(DEFAULT_CONFIG_CANDIDATES),
    }
}

/// Install tracing from the `[logging]` section, falling back to the plain stderr
/// subscriber when no configuration is available or the log directory is unusable.
/// Returns whether the configured subscriber was requested.
fn init_logging(config: Option<&LoggingConfig>) -> bool {
    let Some(config) = config else {
        logging::init();
        return false;
    };
    match sso_common::init_tracing("ssoctl", config) {
        Ok(()) => true,
        Err(err) => {
            logging::init();
            warn!(error = %format!("{err:#}"), "configured logging unavailable; using stderr");
            false
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let logging_config = load_config(config).ok().map(|loaded| loaded.config.logging);
    init_logging(logging_config.as_ref());
    match cli.command {
        Commands::Config(cmd) => config_cmd::run(cmd, config)?,
        Commands::Token(cmd) => token::run(cmd, config)?,
        Commands::Check(cmd) => return check::run(cmd, config),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn logging_falls_back_without_usable_config() {
        assert!(!init_logging(None));

        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let unusable = LoggingConfig {
            directory: blocker.join("logs"),
            ..LoggingConfig::default()
        };
        assert!(!init_logging(Some(&unusable)));

        let usable = LoggingConfig {
            directory: dir.path().join("logs"),
            ..LoggingConfig::default()
        };
        assert!(init_logging(Some(&usable)));
        assert!(usable.directory.is_dir());
    }

    #[test]
    fn check_accepts_several_permissions() {
        let cli = Cli::parse_from([
            "ssoctl", "check", "--token", "abc", "--module", "tc", "view", "add",
        ]);
        match cli.command {
            Commands::Check(cmd) => {
                assert_eq!(cmd.module, "tc");
                assert_eq!(cmd.permissions, vec!["view", "add"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
