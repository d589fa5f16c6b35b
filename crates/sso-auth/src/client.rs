//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
//! HTTP client for the remote identity service.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use sso_common::config::ServiceConfig;
use thiserror::Error;
use tracing::{debug, warn};

use crate::identity::UserId;
use crate::permissions::PermissionPayload;

/// Result of a token verification call that reached the service.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// HTTP 200 with the identity document.
    Verified(Value),
    /// Any other status, with the raw body for classification.
    Rejected { status: u16, body: String },
}

/// Failures talking to the identity service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, DNS failure, timeout.
    #[error("identity service unreachable: {0}")]
    Transport(String),
    /// The service answered with an unexpected status.
    #[error("identity service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The body could not be decoded.
    #[error("identity service response could not be decoded: {0}")]
    Decode(String),
}

/// Calls the core needs from the identity service.
#[async_trait]
pub trait SsoService: Send + Sync {
    /// Verify a raw token.
    async fn verify_token(&self, token: &str) -> Result<VerifyOutcome, ClientError>;

    /// Fetch the permission payload for a user, authenticating with `token`.
    async fn fetch_permissions(
        &self,
        user_id: &UserId,
        token: &str,
    ) -> Result<PermissionPayload, ClientError>;
}

/// Pooled reqwest client bound to the configured endpoints.
#[derive(Debug, Clone)]
pub struct HttpSsoClient {
    http: reqwest::Client,
    verify_url: String,
    permissions_url: String,
    max_retries: u32,
}

impl HttpSsoClient {
    /// Build the client from the `[service]` section.
    pub fn from_config(config: &ServiceConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_size)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .context("failed to build identity service http client")?;
        Ok(Self {
            http,
            verify_url: config.token_verify_url(),
            permissions_url: config.user_permissions_url(),
            max_retries: config.max_retries,
        })
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }

    pub fn permissions_url(&self) -> &str {
        &self.permissions_url
    }

    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, ClientError> {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_retries && (err.is_connect() || err.is_timeout()) => {
                    attempt += 1;
                    warn!(attempt, max_retries = self.max_retries, error = %err, "retrying identity service call");
                }
                Err(err) => return Err(ClientError::Transport(err.to_string())),
            }
        }
    }
}

#[async_trait]
impl SsoService for HttpSsoClient {
    async fn verify_token(&self, token: &str) -> Result<VerifyOutcome, ClientError> {
        let body = json!({ "token": token });
        let response = self
            .send(|| self.http.post(&self.verify_url).json(&body))
            .await?;
        let status = response.status();
        debug!(status = status.as_u16(), "token verification answered");
        if status == StatusCode::OK {
            let identity = response
                .json::<Value>()
                .await
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            return Ok(VerifyOutcome::Verified(identity));
        }
        let body = response.text().await.unwrap_or_default();
        Ok(VerifyOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_permissions(
        &self,
        user_id: &UserId,
        token: &str,
    ) -> Result<PermissionPayload, ClientError> {
        let response = self
            .send(|| {
                self.http
                    .get(&self.permissions_url)
                    .query(&[("user_id", user_id.as_str())])
                    .bearer_auth(token)
            })
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<PermissionPayload>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn endpoints_are_joined_onto_the_base_url() {
        let config = ServiceConfig {
            url: "https://sso.example.com/".into(),
            ..ServiceConfig::default()
        };
        let client = HttpSsoClient::from_config(&config).unwrap();
        assert_eq!(client.verify_url(), "https://sso.example.com/api/auth/verify/");
        assert_eq!(
            client.permissions_url(),
            "https://sso.example.com/api/core/permissions/user/"
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let config = ServiceConfig {
            url: "http://127.0.0.1:1".into(),
            request_timeout: Duration::from_secs(2),
            max_retries: 1,
            ..ServiceConfig::default()
        };
        let client = HttpSsoClient::from_config(&config).unwrap();
        let err = client.verify_token("abc").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
