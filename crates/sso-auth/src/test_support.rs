//! ---
//! sso_section: "02-identity-access"
//! sso_subsection: "module"
//! sso_type: "source"
//! sso_scope: "code"
//! sso_description: "Identity resolution, permission aggregation, and caching."
//! sso_version: "v0.1.0"
//! sso_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::{ClientError, SsoService, VerifyOutcome};
use crate::identity::UserId;
use crate::permissions::PermissionPayload;

enum Behaviour {
    Verify(Value),
    Reject { status: u16, body: String },
    Permissions(Value),
    Unreachable,
}

/// In-process identity service that counts calls.
pub struct MockService {
    behaviour: Behaviour,
    verify_calls: AtomicUsize,
    permission_calls: AtomicUsize,
    last_permission_token: Mutex<Option<String>>,
}

impl MockService {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            verify_calls: AtomicUsize::new(0),
            permission_calls: AtomicUsize::new(0),
            last_permission_token: Mutex::new(None),
        }
    }

    pub fn verifying(identity: Value) -> Self {
        Self::with(Behaviour::Verify(identity))
    }

    pub fn rejecting(status: u16, body: &str) -> Self {
        Self::with(Behaviour::Reject {
            status,
            body: body.to_owned(),
        })
    }

    pub fn with_permissions(payload: Value) -> Self {
        Self::with(Behaviour::Permissions(payload))
    }

    pub fn unreachable() -> Self {
        Self::with(Behaviour::Unreachable)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn permission_calls(&self) -> usize {
        self.permission_calls.load(Ordering::SeqCst)
    }

    pub fn last_permission_token(&self) -> Option<String> {
        self.last_permission_token.lock().clone()
    }
}

#[async_trait]
impl SsoService for MockService {
    async fn verify_token(&self, _token: &str) -> Result<VerifyOutcome, ClientError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Verify(identity) => Ok(VerifyOutcome::Verified(identity.clone())),
            Behaviour::Reject { status, body } => Ok(VerifyOutcome::Rejected {
                status: *status,
                body: body.clone(),
            }),
            Behaviour::Permissions(_) => Ok(VerifyOutcome::Rejected {
                status: 404,
                body: String::new(),
            }),
            Behaviour::Unreachable => Err(ClientError::Transport("connection refused".into())),
        }
    }

    async fn fetch_permissions(
        &self,
        _user_id: &UserId,
        token: &str,
    ) -> Result<PermissionPayload, ClientError> {
        self.permission_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_permission_token.lock() = Some(token.to_owned());
        match &self.behaviour {
            Behaviour::Permissions(payload) => serde_json::from_value(payload.clone())
                .map_err(|err| ClientError::Decode(err.to_string())),
            Behaviour::Unreachable => Err(ClientError::Transport("connection refused".into())),
            _ => Err(ClientError::Status {
                status: 404,
                body: String::new(),
            }),
        }
    }
}
