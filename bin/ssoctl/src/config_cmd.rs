//! ---
//! sso_section: "04-operator-tooling"
//! sso_subsection: "binary"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Control CLI for operators of the SSO gate."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;
use sso_auth::PermissionScheme;
use sso_common::config::SsoConfig;
use sso_logging::{log_auth_event, AuthEventOutcome};

use crate::load_config;

/// Dispatch entry point for configuration subcommands.
pub fn run(command: ConfigCommand, config: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommand::Validate(cmd) => cmd.execute(config),
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Load and validate the configuration, then print a summary.
    #[command(name = "validate")]
    Validate(ValidateCommand),
}

#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Print the fully resolved configuration instead of a summary.
    #[arg(long)]
    full: bool,
}

impl ValidateCommand {
    fn execute(self, config: Option<&Path>) -> Result<()> {
        let loaded = match load_config(config) {
            Ok(loaded) => loaded,
            Err(err) => {
                log_auth_event(None, "config.validate", &format!("{err:#}"), AuthEventOutcome::Fault);
                return Err(err);
            }
        };
        let output = if self.full {
            serde_json::to_value(&loaded.config)?
        } else {
            summary(&loaded.config)
        };
        println!("{}", serde_json::to_string_pretty(&json!({
            "source": loaded.source.display().to_string(),
            "valid": true,
            "config": output,
        }))?);
        Ok(())
    }
}

fn summary(config: &SsoConfig) -> serde_json::Value {
    let scheme = PermissionScheme::from_config(&config.modules, &config.permissions);
    json!({
        "service": config.service.url,
        "token_verify_url": config.service.token_verify_url(),
        "user_permissions_url": config.service.user_permissions_url(),
        "parent_module": scheme.parent_module(),
        "child_modules": scheme.child_modules(),
        "cache_enabled": config.cache.enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_child_modules() {
        let config: SsoConfig = r#"
            [service]
            url = "https://sso.example.com"
            [modules]
            parent = "SYS"
            [modules.children]
            Customers = "tc"
        "#
        .parse()
        .unwrap();
        let value = summary(&config);
        assert_eq!(value["parent_module"], "SYS");
        assert_eq!(value["child_modules"], json!(["tc"]));
        assert_eq!(
            value["token_verify_url"],
            "https://sso.example.com/api/auth/verify/"
        );
    }

    #[test]
    fn explicit_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sso.toml");
        std::fs::write(&path, "[modules]\nparent = \"SYS\"\n").unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.source, path);
        assert_eq!(loaded.config.modules.parent, "SYS");
    }
}
