//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::collections::HashMap;

use sso_logging::LogContext;
use uuid::Uuid;

/// Cookie carrying the access token when no `Authorization` header is sent.
pub const ACCESS_TOKEN_COOKIE: &str = "auth_access_token";

const BEARER_PREFIX: &str = "Bearer ";

/// Per-request data passed through resolution and authorization calls.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    client_ip: Option<String>,
    username: Option<String>,
    authorization: Option<String>,
    cookies: HashMap<String, String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Fresh context with a random request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            client_ip: None,
            username: None,
            authorization: None,
            cookies: HashMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Client address from the first `X-Forwarded-For` entry, else the peer address.
    pub fn with_forwarded_for(mut self, forwarded_for: Option<&str>, remote: Option<&str>) -> Self {
        let forwarded = forwarded_for
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        self.client_ip = forwarded.or(remote).map(str::to_owned);
        self
    }

    pub fn with_user(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Raw `Authorization` header value.
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Parse a `Cookie` header (`a=1; b=2`). Malformed pairs are skipped.
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.cookies
                        .insert(name.to_owned(), value.trim().to_owned());
                }
            }
        }
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Token from a `Bearer` authorization header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .map(str::trim)
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Token from the access token cookie.
    pub fn cookie_token(&self) -> Option<&str> {
        self.cookie(ACCESS_TOKEN_COOKIE)
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Header token first, then the cookie.
    pub fn token(&self) -> Option<&str> {
        self.bearer_token().or_else(|| self.cookie_token())
    }

    /// Authorization header value with an optional `Bearer ` prefix removed.
    /// Unlike [`bearer_token`](Self::bearer_token) a bare header value is accepted.
    pub fn authorization_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .map(str::trim)
            .map(|value| value.strip_prefix(BEARER_PREFIX).unwrap_or(value))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Token forwarded to the permissions endpoint: the header, raw or Bearer, then the cookie.
    pub fn permission_token(&self) -> Option<&str> {
        self.authorization_token().or_else(|| self.cookie_token())
    }

    /// Correlation fields for the logging macros.
    pub fn log_context(&self) -> LogContext<'_> {
        LogContext {
            request_id: Some(&self.request_id),
            user: self.username.as_deref(),
            client_ip: self.client_ip.as_deref(),
            module: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_token_wins_over_cookie() {
        let ctx = RequestContext::new()
            .with_authorization("Bearer header-token")
            .with_cookie(ACCESS_TOKEN_COOKIE, "cookie-token");
        assert_eq!(ctx.token(), Some("header-token"));
    }

    #[test]
    fn cookie_is_used_without_bearer_header() {
        let ctx = RequestContext::new()
            .with_authorization("Basic dXNlcjpwYXNz")
            .with_cookie_header("theme=dark; auth_access_token=cookie-token ; bogus");
        assert_eq!(ctx.bearer_token(), None);
        assert_eq!(ctx.token(), Some("cookie-token"));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
    }

    #[test]
    fn raw_authorization_header_serves_permission_lookups() {
        let ctx = RequestContext::new()
            .with_authorization("  raw-token-no-bearer ")
            .with_cookie(ACCESS_TOKEN_COOKIE, "cookie-token");
        assert_eq!(ctx.bearer_token(), None);
        assert_eq!(ctx.authorization_token(), Some("raw-token-no-bearer"));
        assert_eq!(ctx.permission_token(), Some("raw-token-no-bearer"));

        let bearer = RequestContext::new().with_authorization("Bearer header-token");
        assert_eq!(bearer.authorization_token(), Some("header-token"));

        let cookie_only = RequestContext::new()
            .with_authorization("   ")
            .with_cookie(ACCESS_TOKEN_COOKIE, "cookie-token");
        assert_eq!(cookie_only.permission_token(), Some("cookie-token"));
    }

    #[test]
    fn empty_credentials_are_ignored() {
        let ctx = RequestContext::new()
            .with_authorization("Bearer   ")
            .with_cookie(ACCESS_TOKEN_COOKIE, "");
        assert_eq!(ctx.token(), None);
    }

    #[test]
    fn forwarded_for_takes_first_entry() {
        let ctx = RequestContext::new()
            .with_forwarded_for(Some("203.0.113.7, 10.0.0.1"), Some("127.0.0.1"));
        assert_eq!(ctx.client_ip(), Some("203.0.113.7"));

        let ctx = RequestContext::new().with_forwarded_for(None, Some("127.0.0.1"));
        assert_eq!(ctx.client_ip(), Some("127.0.0.1"));
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(
            RequestContext::new().request_id(),
            RequestContext::new().request_id()
        );
        let ctx = RequestContext::new().with_request_id("req-1").with_user("alice");
        let log = ctx.log_context();
        assert_eq!(log.request_id, Some("req-1"));
        assert_eq!(log.user, Some("alice"));
    }
}
