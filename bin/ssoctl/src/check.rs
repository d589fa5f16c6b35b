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
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use sso_auth::SsoServices;

use crate::load_config;
use crate::token::{authenticate, TokenArgs};

#[derive(Debug, Args)]
pub struct CheckCommand {
    #[command(flatten)]
    pub token: TokenArgs,
    /// Module code the permissions apply to.
    #[arg(long)]
    pub module: String,
    /// Actions or codenames, e.g. `view` or `delete_tc_customer`.
    #[arg(required = true, num_args = 1..)]
    pub permissions: Vec<String>,
}

/// Print `allow` or `deny`; a deny exits with status 1.
pub fn run(command: CheckCommand, config: Option<&Path>) -> Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let loaded = load_config(config)?;
        let services = SsoServices::from_config(&loaded.config, None)?;
        let ctx = command.token.context();
        let principal = authenticate(&services, &ctx).await?;
        let allowed = services
            .gate
            .check(&ctx, &principal, &command.module, command.permissions.as_slice())
            .await;
        let qualified: Vec<String> = command
            .permissions
            .iter()
            .map(|perm| services.gate.scheme().format_permission(&command.module, perm))
            .collect();
        println!(
            "{} {} [{}]",
            if allowed { "allow" } else { "deny" },
            principal.username().unwrap_or("-"),
            qualified.join(", ")
        );
        Ok::<_, anyhow::Error>(if allowed { ExitCode::SUCCESS } else { ExitCode::from(1) })
    })
}
