//! Public library interface for HabitFlow
//!
//! Habits, completion logs, streaks and statistics, reminders, and the
//! record stores that keep one user's data in sync across sessions. The
//! [`HabitFlow`] facade picks the record store once from the configuration
//! and hands out sessions and repositories built on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

pub mod analytics;
pub mod clock;
pub mod config;
pub mod domain;
pub mod i18n;
pub mod reminder;
pub mod repository;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod sync;

// Re-export public modules and types
pub use analytics::{CalendarCell, DayCount, HabitFilter, StatsEngine, StatsSummary, WeekdayCount};
pub use clock::{iso_timestamp, Clock, FixedClock, SystemClock};
pub use config::{BackendConfig, Config, ConfigError};
pub use domain::*;
pub use i18n::Lang;
pub use reminder::{NotificationPermission, NotificationSink, ReminderScheduler, ToastQueue, TracingSink};
pub use repository::{HabitData, HabitRepository, RepositoryError};
pub use rpc::DocumentServer;
pub use session::{GateError, IdentityProvider, LocalIdentity, Session, SessionError, SoftGate, User};
pub use storage::{
    Collection, LocalMirrorStore, RecordStore, RemoteStore, StorageError, StoreKind, Subscription,
    Toggled,
};
pub use sync::SyncStatus;

/// Errors that can occur at the application level
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Entry point tying configuration, record store and clock together
pub struct HabitFlow {
    config: Config,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl HabitFlow {
    /// Open the record store named by `config`
    pub async fn open(config: Config) -> Result<Self, AppError> {
        config.validate()?;

        let store: Arc<dyn RecordStore> = match &config.backend {
            BackendConfig::Local { path } => {
                let path = match path {
                    Some(path) => prepare_database_path(path)?,
                    None => config::default_database_path()?,
                };
                tracing::info!("Using local mirror at: {}", path.display());
                Arc::new(LocalMirrorStore::new(path)?)
            }
            BackendConfig::Remote { addr } => {
                tracing::info!("Using document server at: {}", addr);
                Arc::new(RemoteStore::connect(addr).await?)
            }
        };

        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    pub fn with_store(config: Config, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { config, store, clock }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Start a session for whoever `identity` reports as signed in
    pub async fn start_session(&self, identity: &dyn IdentityProvider) -> Result<Session, AppError> {
        let user = identity.current_user().ok_or(SessionError::NotSignedIn)?;

        Ok(Session::start(
            self.store(),
            self.clock(),
            SoftGate::new(self.config.passcode.clone()),
            &self.config.app_id,
            user,
        )
        .await?)
    }

    /// A repository attached to an authorized session's owner
    pub async fn repository(&self, session: &Session) -> Result<HabitRepository, AppError> {
        session.require_authorized()?;

        let mut repository = HabitRepository::new(self.store(), self.clock());
        repository.attach(session.owner().clone()).await?;
        Ok(repository)
    }

    /// Reminder scheduler over `repository`'s live data
    pub fn reminders(
        &self,
        repository: &HabitRepository,
        sink: Arc<dyn NotificationSink>,
    ) -> ReminderScheduler {
        ReminderScheduler::new(self.clock(), repository.changes(), sink)
            .with_lang(self.config.language)
            .with_permission(self.config.notifications)
            .with_period(self.config.reminder_period())
    }
}

/// Create the parent directory of an explicit database path
fn prepare_database_path(path: &Path) -> Result<PathBuf, AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(path.to_path_buf())
}
