//! SQLite implementation of the record store
//!
//! The local mirror keeps one row per (collection, owner): the key is
//! `{collection}_{owner}` and the value is the JSON list of that
//! collection's records. Every write rewrites the list inside a transaction
//! and then pushes the new list to the collection's subscribers.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::domain::OwnerId;
use crate::storage::{
    migrations, record_id, with_id, Collection, RecordStore, Snapshot, SnapshotResult,
    StorageError, StoreKind, Subscription, Toggled,
};
use tokio::sync::mpsc;

/// A subscriber to one (owner, collection)
struct Listener {
    owner: OwnerId,
    collection: Collection,
    sender: mpsc::UnboundedSender<SnapshotResult>,
}

/// SQLite-backed local mirror store
///
/// The connection mutex is held across write, re-read and fan-out so that
/// subscribers always see snapshots in commit order.
pub struct LocalMirrorStore {
    conn: Mutex<Connection>,
    listeners: Mutex<Vec<Listener>>,
}

impl LocalMirrorStore {
    /// Open (or create) the mirror database at `db_path`
    ///
    /// This opens the database file and runs any necessary migrations
    /// to ensure the schema is up to date.
    pub fn new(db_path: PathBuf) -> Result<Self, StorageError> {
        let conn = Connection::open(&db_path)
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;

        let store = Self::from_connection(conn)?;
        tracing::info!("Local mirror store initialized at: {:?}", db_path);
        Ok(store)
    }

    /// A mirror that lives only as long as this value
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StorageError> {
        migrations::initialize_database(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Row key of one owner's collection
    pub fn mirror_key(collection: Collection, owner: &OwnerId) -> String {
        format!("{}_{}", collection.as_str(), owner)
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_list(conn: &Connection, key: &str) -> Result<Snapshot, StorageError> {
        let stored: Option<String> = conn
            .query_row("SELECT value FROM mirror WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match stored {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_list(conn: &Connection, key: &str, list: &[Value]) -> Result<(), StorageError> {
        let json = serde_json::to_string(list)?;
        conn.execute(
            "INSERT INTO mirror (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Apply `change` to one collection's list in a transaction, then
    /// publish the committed list
    fn mutate<T>(
        &self,
        owner: &OwnerId,
        collection: Collection,
        change: impl FnOnce(&mut Snapshot) -> Result<(T, bool), StorageError>,
    ) -> Result<T, StorageError> {
        let key = Self::mirror_key(collection, owner);
        let mut conn = self.connection();

        let tx = conn.transaction()?;
        let mut list = Self::read_list(&tx, &key)?;
        let (outcome, changed) = change(&mut list)?;
        if changed {
            Self::write_list(&tx, &key, &list)?;
        }
        tx.commit()?;

        if changed {
            self.publish(owner, collection, &list);
        }
        Ok(outcome)
    }

    /// Send a snapshot to every live subscriber of (owner, collection)
    fn publish(&self, owner: &OwnerId, collection: Collection, snapshot: &Snapshot) {
        let mut listeners = self.listeners();
        listeners.retain(|listener| {
            if listener.owner != *owner || listener.collection != collection {
                return !listener.sender.is_closed();
            }
            listener.sender.send(Ok(snapshot.clone())).is_ok()
        });
    }

    fn position(list: &[Value], id: &str) -> Option<usize> {
        list.iter().position(|record| record_id(record) == Some(id))
    }
}

#[async_trait]
impl RecordStore for LocalMirrorStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        collection: Collection,
    ) -> Result<Subscription, StorageError> {
        let conn = self.connection();
        let current = Self::read_list(&conn, &Self::mirror_key(collection, owner))?;

        let (sender, subscription) = Subscription::channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(Ok(current));
        self.listeners().push(Listener {
            owner: owner.clone(),
            collection,
            sender,
        });
        drop(conn);

        tracing::debug!("Subscribed to {} of {}", collection, owner);
        Ok(subscription)
    }

    async fn get(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, StorageError> {
        let conn = self.connection();
        let list = Self::read_list(&conn, &Self::mirror_key(collection, owner))?;
        Ok(list.into_iter().find(|record| record_id(record) == Some(id)))
    }

    async fn put(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<(), StorageError> {
        let record = with_id(id, record)?;

        self.mutate(owner, collection, |list| {
            match Self::position(list, id) {
                Some(index) if list[index] == record => return Ok(((), false)),
                Some(index) => list[index] = record,
                None => list.push(record),
            }
            Ok(((), true))
        })?;

        tracing::debug!("Stored {}/{} for {}", collection, id, owner);
        Ok(())
    }

    async fn remove(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
    ) -> Result<(), StorageError> {
        self.mutate(owner, collection, |list| match Self::position(list, id) {
            Some(index) => {
                list.remove(index);
                Ok(((), true))
            }
            None => Ok(((), false)),
        })?;

        tracing::debug!("Removed {}/{} for {}", collection, id, owner);
        Ok(())
    }

    async fn toggle(
        &self,
        owner: &OwnerId,
        collection: Collection,
        id: &str,
        record: Value,
    ) -> Result<Toggled, StorageError> {
        let record = with_id(id, record)?;

        let outcome = self.mutate(owner, collection, |list| {
            match Self::position(list, id) {
                Some(index) => {
                    list.remove(index);
                    Ok((Toggled::Removed, true))
                }
                None => {
                    list.push(record);
                    Ok((Toggled::Created, true))
                }
            }
        })?;

        tracing::debug!("Toggled {}/{} for {}: {:?}", collection, id, owner, outcome);
        Ok(outcome)
    }
}
