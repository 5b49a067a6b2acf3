//! Storage layer for persisting habit data
//!
//! Records live in schemaless per-owner collections. Two backends implement
//! the same [`RecordStore`] interface: a local SQLite mirror and a remote
//! document service reached over TCP. Callers only learn which one is active
//! through [`RecordStore::kind`].

pub mod migrations;
pub mod remote;
pub mod sqlite;

// Re-export the main storage types
pub use remote::RemoteStore;
pub use sqlite::LocalMirrorStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::OwnerId;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Remote store error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Migration error: {0}")]
    Migration(String),
}

/// Named record collections, each scoped per owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Habits,
    Logs,
    /// Per-user profile documents (the soft-gate flag lives here)
    Profile,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Habits => "habits",
            Collection::Logs => "logs",
            Collection::Profile => "profile",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "habits" => Ok(Collection::Habits),
            "logs" => Ok(Collection::Logs),
            "profile" => Ok(Collection::Profile),
            other => Err(StorageError::UnknownCollection(other.to_string())),
        }
    }
}

/// Which kind of backend is serving records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Remote,
    Local,
}

/// Outcome of a keyed toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggled {
    Created,
    Removed,
}

/// Every record of one (owner, collection), in no particular order
pub type Snapshot = Vec<Value>;

pub type SnapshotResult = Result<Snapshot, StorageError>;

/// A live view of one collection
///
/// Yields the current snapshot immediately, then a new one after every
/// change. Dropping the subscription stops delivery; backends notice the
/// closed channel and forget the listener on their next notification.
/// Writes issued before the drop are not cancelled.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<SnapshotResult>,
}

impl Subscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<SnapshotResult>) -> Self {
        Self { receiver }
    }

    /// Create a connected sender/subscription pair
    pub fn channel() -> (mpsc::UnboundedSender<SnapshotResult>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self::new(receiver))
    }

    /// Wait for the next snapshot; `None` once the backend stops delivering
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }

    pub fn into_stream(self) -> BoxStream<'static, SnapshotResult> {
        Box::pin(stream::unfold(self.receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        }))
    }

    /// Stop receiving snapshots
    pub fn cancel(self) {
        drop(self);
    }
}

/// Trait defining the record store interface
///
/// `put` and `remove` are idempotent: repeating either call with the same
/// arguments leaves the store in an equivalent state. Failures are reported
/// to the caller and never retried internally.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> StoreKind;

    /// Watch a collection
    async fn subscribe(
        &self,
        owner: &OwnerId,
        collection: Collection,
    ) -> Result<Subscription, StorageError>;

    /// Read a single record
    async fn get(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, StorageError>;

    /// Create or replace the record stored under `id`
    async fn put(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<(), StorageError>;

    /// Delete the record stored under `id`; deleting a missing record succeeds
    async fn remove(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
    ) -> Result<(), StorageError>;

    /// Delete the record under `id` if present, otherwise store `record`
    /// under it, as one atomic step
    async fn toggle(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<Toggled, StorageError>;
}

/// Stamp the record id into the document body
///
/// Records are stored as JSON objects carrying their own `id` field.
pub fn with_id(id: &str, record: Value) -> Result<Value, StorageError> {
    match record {
        Value::Object(mut fields) => {
            fields.insert("id".to_string(), Value::String(id.to_string()));
            Ok(Value::Object(fields))
        }
        other => Err(StorageError::InvalidRecord(format!(
            "expected a JSON object for record '{}', got {}",
            id, other
        ))),
    }
}

/// The `id` field of a stored record
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}
