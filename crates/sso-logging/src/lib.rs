//! ---
//! sso_section: "03-logging"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Structured logging adapters carrying request correlation fields."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
#![warn(missing_docs)]

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development and tools.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Correlation fields attached to every event emitted through the macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Request identifier assigned when the request entered the application.
    pub request_id: Option<&'a str>,
    /// Username of the principal, when known.
    pub user: Option<&'a str>,
    /// Client address as seen by the application.
    pub client_ip: Option<&'a str>,
    /// Module the current operation is scoped to.
    pub module: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a request identifier.
    pub fn with_request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach a username.
    pub fn with_user(mut self, user: &'a str) -> Self {
        self.user = Some(user);
        self
    }

    /// Attach a client address.
    pub fn with_client_ip(mut self, client_ip: &'a str) -> Self {
        self.client_ip = Some(client_ip);
        self
    }

    /// Attach a module code.
    pub fn with_module(mut self, module: &'a str) -> Self {
        self.module = Some(module);
        self
    }
}

/// Outcome recorded with authentication and authorization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventOutcome {
    /// The principal was authenticated or the access was granted.
    Allowed,
    /// Authentication failed or access was refused.
    Denied,
    /// The decision could not be made because a dependency failed.
    Fault,
}

impl AuthEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuthEventOutcome::Allowed => "allowed",
            AuthEventOutcome::Denied => "denied",
            AuthEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized auth event with an outcome.
pub fn log_auth_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: AuthEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    // tracing::event! needs a constant level per call site.
    match outcome {
        AuthEventOutcome::Allowed => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            request_id = ctx.request_id.unwrap_or(""),
            user = ctx.user.unwrap_or(""),
            client_ip = ctx.client_ip.unwrap_or(""),
            module = ctx.module.unwrap_or(""),
            message = %message
        ),
        AuthEventOutcome::Denied => tracing::event!(
            Level::WARN,
            event,
            outcome = outcome.as_str(),
            request_id = ctx.request_id.unwrap_or(""),
            user = ctx.user.unwrap_or(""),
            client_ip = ctx.client_ip.unwrap_or(""),
            module = ctx.module.unwrap_or(""),
            message = %message
        ),
        AuthEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            request_id = ctx.request_id.unwrap_or(""),
            user = ctx.user.unwrap_or(""),
            client_ip = ctx.client_ip.unwrap_or(""),
            module = ctx.module.unwrap_or(""),
            message = %message
        ),
    }
}

/// Shorten a credential for logging: first ten and last four characters.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 14 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_request_id("req-1")
            .with_user("alice")
            .with_client_ip("10.0.0.1");
        sso_info!(context = ctx.clone(), "identity resolved");
        sso_debug!("debug message");
        sso_warn!(context = ctx.clone().with_module("tc"), "missing {}", "tc.view_tc");
        sso_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn auth_event_helper_emits() {
        init();
        let ctx = LogContext::new().with_user("alice");
        log_auth_event(
            Some(&ctx),
            "permission.check",
            "access granted",
            AuthEventOutcome::Allowed,
        );
        log_auth_event(None, "token.verify", "service down", AuthEventOutcome::Fault);
    }

    #[test]
    fn mask_token_hides_the_middle() {
        assert_eq!(mask_token("abcdefghijklmnopqrst"), "abcdefghij...qrst");
        assert_eq!(mask_token("short"), "*****");
    }
}
