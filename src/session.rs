//! Identity and the application-level soft gate
//!
//! The soft gate is NOT authentication. It compares a shared passcode in
//! plain text and records a per-user `authorized` flag in the profile
//! collection. It keeps casual visitors out of the UI and nothing more;
//! never base a real access-control decision on it. Wrong attempts only
//! earn a short display delay, with no lockout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::clock::{iso_timestamp, Clock};
use crate::domain::OwnerId;
use crate::storage::{Collection, RecordStore, StorageError};

/// Passcode used when none is configured
pub const DEFAULT_PASSCODE: &str = "081234";

/// Id of the profile record holding the gate flag
pub const SECURITY_RECORD: &str = "security";

/// How long a rejection is shown before the next attempt
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Wrong passcode, try again in {}s", .retry_after.as_secs())]
    Rejected { retry_after: Duration },
}

/// Errors that can occur while establishing a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No user is signed in")]
    NotSignedIn,

    #[error("This session has not passed the passcode gate")]
    NotAuthorized,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque identifier, stable across sessions
    pub id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Source of the signed-in user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;

    /// Watch sign-in state transitions
    fn changes(&self) -> watch::Receiver<Option<User>>;

    async fn sign_in(&self) -> Result<User, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

/// Identity provider for a single configured user
pub struct LocalIdentity {
    user: User,
    state: watch::Sender<Option<User>>,
}

impl LocalIdentity {
    /// Starts signed out
    pub fn new(user: User) -> Self {
        let (state, _) = watch::channel(None);
        Self { user, state }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn current_user(&self) -> Option<User> {
        self.state.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<User>> {
        self.state.subscribe()
    }

    async fn sign_in(&self) -> Result<User, SessionError> {
        self.state.send_replace(Some(self.user.clone()));
        info!("Signed in as {}", self.user.id);
        Ok(self.user.clone())
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        if self.state.send_replace(None).is_some() {
            info!("Signed out {}", self.user.id);
        }
        Ok(())
    }
}

/// Shared-passcode gate
#[derive(Debug, Clone)]
pub struct SoftGate {
    passcode: String,
}

impl Default for SoftGate {
    fn default() -> Self {
        Self::new(DEFAULT_PASSCODE)
    }
}

impl SoftGate {
    pub fn new(passcode: impl Into<String>) -> Self {
        Self {
            passcode: passcode.into(),
        }
    }

    pub fn check(&self, attempt: &str) -> Result<(), GateError> {
        if attempt == self.passcode {
            Ok(())
        } else {
            Err(GateError::Rejected {
                retry_after: RETRY_DELAY,
            })
        }
    }
}

/// One signed-in user's session
pub struct Session {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    gate: SoftGate,
    user: User,
    owner: OwnerId,
    authorized: bool,
}

impl Session {
    /// Begin a session, reading the user's gate flag once
    pub async fn start(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        gate: SoftGate,
        app_id: &str,
        user: User,
    ) -> Result<Self, SessionError> {
        let owner = OwnerId::scoped(app_id, &user.id);
        let authorized = match store.get(&owner, Collection::Profile, SECURITY_RECORD).await? {
            Some(record) => record.get("authorized") == Some(&Value::Bool(true)),
            None => false,
        };

        info!("Session started for {} (authorized: {})", user.id, authorized);
        Ok(Self {
            store,
            clock,
            gate,
            user,
            owner,
            authorized,
        })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn require_authorized(&self) -> Result<(), SessionError> {
        if self.authorized {
            Ok(())
        } else {
            Err(SessionError::NotAuthorized)
        }
    }

    /// Pass the gate and persist the flag; a no-op once authorized
    pub async fn authorize(&mut self, passcode: &str) -> Result<(), SessionError> {
        if self.authorized {
            return Ok(());
        }

        if let Err(e) = self.gate.check(passcode) {
            warn!("Rejected passcode for {}", self.user.id);
            return Err(e.into());
        }

        let record = json!({
            "authorized": true,
            "updatedAt": iso_timestamp(&self.clock.now()),
        });
        self.store
            .put(&self.owner, Collection::Profile, SECURITY_RECORD, record)
            .await?;

        self.authorized = true;
        info!("Authorized {}", self.user.id);
        Ok(())
    }
}
