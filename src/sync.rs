//! Sync status signal
//!
//! A UI-facing summary of how the live subscription is doing. It has no
//! effect on what the repository stores or returns.

use serde::{Deserialize, Serialize};

use crate::storage::StoreKind;

/// Health of the connection to the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting for the first snapshot after a new owner subscribed
    #[default]
    Syncing,
    Synced,
    /// Running on the local mirror
    Local,
    /// A subscription failed; a new attach is needed to recover
    Error,
    /// Reserved. Nothing currently detects conflicting writers.
    Conflict,
}

impl SyncStatus {
    /// Status when a new owner subscribes
    pub fn on_subscribe(kind: StoreKind) -> Self {
        match kind {
            StoreKind::Local => SyncStatus::Local,
            StoreKind::Remote => SyncStatus::Syncing,
        }
    }

    /// Status after a snapshot arrived
    pub fn on_snapshot(self) -> Self {
        match self {
            SyncStatus::Syncing => SyncStatus::Synced,
            other => other,
        }
    }

    /// Status after a subscription failed
    pub fn on_failure(self) -> Self {
        SyncStatus::Error
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Local => "local",
            SyncStatus::Error => "error",
            SyncStatus::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
