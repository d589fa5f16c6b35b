//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to the embedding application by identity resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The credential was malformed or rejected by the identity service.
    #[error("{message}")]
    TokenInvalid {
        /// Human readable reason.
        message: String,
        /// Status returned by the identity service, when one was received.
        status: Option<u16>,
        /// Raw response body kept for diagnostics.
        body: Option<String>,
    },
    /// The identity service explicitly reported the credential as expired.
    #[error("{message}")]
    TokenExpired {
        /// Human readable reason.
        message: String,
    },
    /// The principal lacks the permissions required for the operation.
    #[error("{message}")]
    PermissionDenied {
        /// Human readable reason.
        message: String,
    },
    /// The identity service could not be reached or timed out.
    #[error("{message}")]
    ServiceUnavailable {
        /// Human readable reason.
        message: String,
    },
}

impl AuthError {
    /// Rejected credential with the default message.
    pub fn token_invalid(status: Option<u16>, body: Option<String>) -> Self {
        AuthError::TokenInvalid {
            message: "Invalid authentication token".into(),
            status,
            body,
        }
    }

    /// Expired credential with the default message.
    pub fn token_expired() -> Self {
        AuthError::TokenExpired {
            message: "Authentication token expired".into(),
        }
    }

    /// Denied access naming the missing permission.
    pub fn permission_denied(detail: impl Into<String>) -> Self {
        AuthError::PermissionDenied {
            message: format!("Permission denied: {}", detail.into()),
        }
    }

    /// Unreachable identity service with the transport detail appended.
    pub fn service_unavailable(detail: impl std::fmt::Display) -> Self {
        AuthError::ServiceUnavailable {
            message: format!("Authentication service is temporarily unavailable: {detail}"),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TokenInvalid { .. } => "token_invalid",
            AuthError::TokenExpired { .. } => "token_expired",
            AuthError::PermissionDenied { .. } => "permission_denied",
            AuthError::ServiceUnavailable { .. } => "service_unavailable",
        }
    }

    /// True for every credential failure, expired included.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::TokenInvalid { .. } | AuthError::TokenExpired { .. }
        )
    }

    /// Suggested HTTP status for the embedding application.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::TokenInvalid { .. } | AuthError::TokenExpired { .. } => 401,
            AuthError::PermissionDenied { .. } => 403,
            AuthError::ServiceUnavailable { .. } => 503,
        }
    }

    /// JSON body in the `{code, message}` shape clients expect.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }
}

/// Serializable error payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_is_a_token_error_with_its_own_code() {
        let err = AuthError::token_expired();
        assert!(err.is_token_error());
        assert_eq!(err.code(), "token_expired");
        assert_eq!(err.http_status(), 401);
        assert!(!AuthError::permission_denied("tc.view_tc").is_token_error());
    }

    #[test]
    fn body_serializes_code_and_message() {
        let body = AuthError::service_unavailable("connection refused").body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "service_unavailable");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .ends_with("connection refused"));
    }
}
