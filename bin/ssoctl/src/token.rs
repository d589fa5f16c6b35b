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
use sso_auth::{Principal, RequestContext, SsoServices};

use crate::load_config;

/// Dispatch entry point for token subcommands.
pub fn run(command: TokenCommand, config: Option<&Path>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    match command {
        TokenCommand::Verify(args) => runtime.block_on(verify(args, config)),
        TokenCommand::Permissions(args) => runtime.block_on(permissions(args, config)),
    }
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Verify a token and print the resolved profile.
    #[command(name = "verify")]
    Verify(TokenArgs),
    /// Print the effective permission set of a token's owner.
    #[command(name = "permissions")]
    Permissions(TokenArgs),
}

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Raw access token (a `Bearer ` prefix is accepted).
    #[arg(long, env = "SSO_GATE_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl TokenArgs {
    pub fn context(&self) -> RequestContext {
        let token = self.token.trim();
        let header = if token.starts_with("Bearer ") {
            token.to_owned()
        } else {
            format!("Bearer {token}")
        };
        RequestContext::new().with_authorization(header)
    }
}

/// Authenticate the token or fail with the auth error rendered as JSON.
pub async fn authenticate(services: &SsoServices, ctx: &RequestContext) -> Result<Principal> {
    match services.resolver.authenticate(ctx).await {
        Ok(Principal::Anonymous) => anyhow::bail!("no token supplied"),
        Ok(principal) => Ok(principal),
        Err(err) => anyhow::bail!("{}", serde_json::to_string(&err.body())?),
    }
}

async fn verify(args: TokenArgs, config: Option<&Path>) -> Result<()> {
    let loaded = load_config(config)?;
    let services = SsoServices::from_config(&loaded.config, None)?;
    let ctx = args.context();
    let principal = authenticate(&services, &ctx).await?;
    let Principal::Sso(identity) = &principal else {
        anyhow::bail!("token did not resolve to an SSO identity");
    };
    let profile = services.cache.profile_for(identity);
    println!("{}", serde_json::to_string_pretty(&json!({
        "profile": profile,
        "modules": identity.modules,
    }))?);
    Ok(())
}

async fn permissions(args: TokenArgs, config: Option<&Path>) -> Result<()> {
    let loaded = load_config(config)?;
    let services = SsoServices::from_config(&loaded.config, None)?;
    let ctx = args.context();
    let principal = authenticate(&services, &ctx).await?;
    let effective = services
        .gate
        .effective_permissions(&ctx, &principal)
        .await
        .map_err(|err| anyhow::anyhow!("{}", err))?;
    println!("{}", serde_json::to_string_pretty(&json!({
        "user": principal.username(),
        "superuser": principal.is_superuser(),
        "permissions": effective.iter().collect::<Vec<_>>(),
    }))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_optional() {
        let plain = TokenArgs { token: "abc".into() };
        let prefixed = TokenArgs { token: "Bearer abc".into() };
        assert_eq!(plain.context().token(), Some("abc"));
        assert_eq!(prefixed.context().token(), Some("abc"));
    }
}
