//! Habit and log repository
//!
//! Owns the in-memory mirrors of the signed-in user's habits and logs. The
//! mirrors are only ever replaced by snapshots from the record store; write
//! operations go to the store and become visible once the next snapshot
//! arrives.
//!
//! Writes issued before [`HabitRepository::detach`] are not cancelled and may
//! still commit afterwards.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::domain::{DomainError, Habit, HabitDraft, HabitId, Log, OwnerId};
use crate::storage::{Collection, RecordStore, StorageError, Subscription, Toggled};
use crate::sync::SyncStatus;

/// Errors that can occur during repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Habit not found: {0}")]
    HabitNotFound(HabitId),

    #[error("Record store subscription failed")]
    Unavailable,

    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The committed habits and logs of one owner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HabitData {
    pub habits: Vec<Habit>,
    pub logs: Vec<Log>,
}

impl HabitData {
    pub fn new(habits: Vec<Habit>, logs: Vec<Log>) -> Self {
        Self { habits, logs }
    }

    pub fn habit(&self, id: &HabitId) -> Option<&Habit> {
        self.habits.iter().find(|habit| &habit.id == id)
    }

    /// The log of `habit_id` on `date`, whatever id it was stored under
    pub fn log_for(&self, habit_id: &HabitId, date: NaiveDate) -> Option<&Log> {
        self.logs
            .iter()
            .find(|log| &log.habit_id == habit_id && log.date == date)
    }

    pub fn logs_for<'a>(&'a self, habit_id: &'a HabitId) -> impl Iterator<Item = &'a Log> + 'a {
        self.logs.iter().filter(move |log| &log.habit_id == habit_id)
    }

    pub fn logs_on(&self, date: NaiveDate) -> impl Iterator<Item = &Log> + '_ {
        self.logs.iter().filter(move |log| log.date == date)
    }

    pub fn is_done(&self, habit_id: &HabitId, date: NaiveDate) -> bool {
        self.log_for(habit_id, date).is_some()
    }

    /// Distinct days on which `habit_id` was completed
    pub fn dates_for(&self, habit_id: &HabitId) -> BTreeSet<NaiveDate> {
        self.logs_for(habit_id).map(|log| log.date).collect()
    }

    /// Logs whose habit no longer exists
    pub fn orphaned_logs(&self) -> Vec<&Log> {
        self.logs
            .iter()
            .filter(|log| self.habit(&log.habit_id).is_none())
            .collect()
    }
}

/// Repository for one signed-in user's habits and logs
pub struct HabitRepository {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    owner: Option<OwnerId>,
    data: Arc<watch::Sender<Arc<HabitData>>>,
    status: Arc<watch::Sender<SyncStatus>>,
    /// Which collections have delivered their first snapshot
    loaded: Arc<watch::Sender<u8>>,
    /// Bumped on every attach/detach so late snapshots of an old owner are dropped
    epoch: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl HabitRepository {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        let (data, _) = watch::channel(Arc::new(HabitData::default()));
        let (status, _) = watch::channel(SyncStatus::on_subscribe(store.kind()));
        let (loaded, _) = watch::channel(0);

        Self {
            store,
            clock,
            owner: None,
            data: Arc::new(data),
            status: Arc::new(status),
            loaded: Arc::new(loaded),
            epoch: Arc::new(AtomicU64::new(0)),
            tasks: Vec::new(),
        }
    }

    /// Start mirroring `owner`'s collections, replacing any previous owner
    ///
    /// A subscription failure is reported both as the returned error and as
    /// [`SyncStatus::Error`].
    pub async fn attach(&mut self, owner: OwnerId) -> Result<(), RepositoryError> {
        self.detach();

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.status
            .send_replace(SyncStatus::on_subscribe(self.store.kind()));
        info!("Attaching repository to {}", owner);

        let habits = self.subscribe(&owner, Collection::Habits).await?;
        let logs = self.subscribe(&owner, Collection::Logs).await?;

        self.tasks.push(tokio::spawn(mirror(habits, Collection::Habits, self.mirror_state(epoch))));
        self.tasks.push(tokio::spawn(mirror(logs, Collection::Logs, self.mirror_state(epoch))));

        self.owner = Some(owner);
        Ok(())
    }

    fn mirror_state(&self, epoch: u64) -> MirrorState {
        MirrorState {
            epoch,
            current_epoch: Arc::clone(&self.epoch),
            data: Arc::clone(&self.data),
            status: Arc::clone(&self.status),
            loaded: Arc::clone(&self.loaded),
        }
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        collection: Collection,
    ) -> Result<Subscription, RepositoryError> {
        match self.store.subscribe(owner, collection).await {
            Ok(subscription) => Ok(subscription),
            Err(e) => {
                error!("Failed to subscribe to {} of {}: {}", collection, owner, e);
                self.status.send_modify(|status| *status = status.on_failure());
                Err(e.into())
            }
        }
    }

    /// Stop mirroring and clear both collections
    pub fn detach(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.data.send_replace(Arc::new(HabitData::default()));
        self.loaded.send_replace(0);

        if let Some(owner) = self.owner.take() {
            info!("Detached repository from {}", owner);
        }
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    fn signed_in(&self) -> Result<&OwnerId, RepositoryError> {
        self.owner.as_ref().ok_or(RepositoryError::NotSignedIn)
    }

    /// The latest committed state
    pub fn data(&self) -> Arc<HabitData> {
        Arc::clone(&self.data.borrow())
    }

    /// Watch committed state as snapshots arrive
    pub fn changes(&self) -> watch::Receiver<Arc<HabitData>> {
        self.data.subscribe()
    }

    /// Wait until both collections have delivered their first snapshot
    pub async fn loaded(&self) -> Result<Arc<HabitData>, RepositoryError> {
        self.signed_in()?;
        let mut loaded = self.loaded.subscribe();
        let mut status = self.status.subscribe();

        loop {
            if *loaded.borrow_and_update() == ALL_LOADED {
                return Ok(self.data());
            }
            if *status.borrow_and_update() == SyncStatus::Error {
                return Err(RepositoryError::Unavailable);
            }

            // Both senders live as long as `self`
            tokio::select! {
                _ = loaded.changed() => {}
                _ = status.changed() => {}
            }
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Create a habit with a fresh id, stamped with the current time
    ///
    /// No uniqueness check is made on the name.
    pub async fn add_habit(&self, draft: HabitDraft) -> Result<Habit, RepositoryError> {
        let owner = self.signed_in()?;
        let habit = Habit::new(draft, self.clock.now().with_timezone(&Utc))?;

        self.write_habit(owner, &habit).await?;
        info!("Created habit '{}' ({})", habit.name, habit.id);
        Ok(habit)
    }

    /// Delete a habit; its logs stay in the store
    pub async fn delete_habit(&self, id: &HabitId) -> Result<(), RepositoryError> {
        let owner = self.signed_in()?;

        self.store
            .remove(owner, Collection::Habits, id.as_str())
            .await
            .map_err(|e| write_failed("delete habit", e))?;
        info!("Deleted habit {}", id);
        Ok(())
    }

    /// Update a habit's editable fields in place
    ///
    /// The id and creation time are kept, so existing logs stay attached.
    pub async fn edit_habit(&self, id: &HabitId, draft: HabitDraft) -> Result<Habit, RepositoryError> {
        let owner = self.signed_in()?;
        let existing = self.find_habit(owner, id).await?;
        let habit = Habit::with_id(existing.id, draft, existing.created_at)?;

        self.write_habit(owner, &habit).await?;
        info!("Updated habit '{}' ({})", habit.name, habit.id);
        Ok(habit)
    }

    /// Delete a habit and create a new one from `draft` under a fresh id
    ///
    /// Logs of the old id are orphaned. Prefer [`edit_habit`](Self::edit_habit).
    pub async fn replace_habit(&self, id: &HabitId, draft: HabitDraft) -> Result<Habit, RepositoryError> {
        let owner = self.signed_in()?;
        let habit = Habit::new(draft, self.clock.now().with_timezone(&Utc))?;

        self.store
            .remove(owner, Collection::Habits, id.as_str())
            .await
            .map_err(|e| write_failed("delete habit", e))?;
        self.write_habit(owner, &habit).await?;
        info!("Replaced habit {} with {}", id, habit.id);
        Ok(habit)
    }

    /// Mark `habit_id` done on `date`, or undo it if it already is
    pub async fn toggle_log(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Toggled, RepositoryError> {
        let owner = self.signed_in()?;

        // A log written under a legacy id cannot be toggled by key
        if let Some(legacy) = self.legacy_log(habit_id, date) {
            self.store
                .remove(owner, Collection::Logs, legacy.id.as_str())
                .await
                .map_err(|e| write_failed("remove log", e))?;
            debug!("Removed legacy log {}", legacy.id);
            return Ok(Toggled::Removed);
        }

        let log = Log::for_day(habit_id.clone(), date, self.clock.now());
        let outcome = self
            .store
            .toggle(owner, Collection::Logs, log.id.as_str(), serde_json::to_value(&log)?)
            .await
            .map_err(|e| write_failed("toggle log", e))?;

        debug!("Toggled {} on {}: {:?}", habit_id, date, outcome);
        Ok(outcome)
    }

    /// Record or correct the completion of `habit_id` on `date` at `time`
    ///
    /// An existing log for that day gets the new timestamp; otherwise a new
    /// log is created.
    pub async fn add_custom_log(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Log, RepositoryError> {
        let owner = self.signed_in()?;
        let timestamp = self.clock.at(date, time);

        let log = match self.legacy_log(habit_id, date) {
            Some(mut existing) => {
                existing.timestamp = timestamp;
                existing
            }
            None => Log::for_day(habit_id.clone(), date, timestamp),
        };

        self.store
            .put(owner, Collection::Logs, log.id.as_str(), serde_json::to_value(&log)?)
            .await
            .map_err(|e| write_failed("backfill log", e))?;

        info!("Logged {} on {} at {}", habit_id, date, time.format("%H:%M"));
        Ok(log)
    }

    fn legacy_log(&self, habit_id: &HabitId, date: NaiveDate) -> Option<Log> {
        self.data()
            .log_for(habit_id, date)
            .filter(|log| !log.has_day_key())
            .cloned()
    }

    async fn find_habit(&self, owner: &OwnerId, id: &HabitId) -> Result<Habit, RepositoryError> {
        if let Some(habit) = self.data().habit(id) {
            return Ok(habit.clone());
        }

        match self.store.get(owner, Collection::Habits, id.as_str()).await? {
            Some(record) => Ok(serde_json::from_value(record)?),
            None => Err(RepositoryError::HabitNotFound(id.clone())),
        }
    }

    async fn write_habit(&self, owner: &OwnerId, habit: &Habit) -> Result<(), RepositoryError> {
        self.store
            .put(owner, Collection::Habits, habit.id.as_str(), serde_json::to_value(habit)?)
            .await
            .map_err(|e| write_failed("save habit", e))
    }
}

impl Drop for HabitRepository {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn write_failed(action: &str, e: StorageError) -> RepositoryError {
    error!("Failed to {}: {}", action, e);
    RepositoryError::Storage(e)
}

const HABITS_LOADED: u8 = 0b01;
const LOGS_LOADED: u8 = 0b10;
const ALL_LOADED: u8 = HABITS_LOADED | LOGS_LOADED;

/// Shared state a mirror task writes into
struct MirrorState {
    epoch: u64,
    current_epoch: Arc<AtomicU64>,
    data: Arc<watch::Sender<Arc<HabitData>>>,
    status: Arc<watch::Sender<SyncStatus>>,
    loaded: Arc<watch::Sender<u8>>,
}

impl MirrorState {
    fn is_current(&self) -> bool {
        self.current_epoch.load(Ordering::SeqCst) == self.epoch
    }
}

/// Copy one collection's snapshots into the shared mirror
async fn mirror(mut subscription: Subscription, collection: Collection, state: MirrorState) {
    let loaded_bit = match collection {
        Collection::Habits => HABITS_LOADED,
        Collection::Logs => LOGS_LOADED,
        Collection::Profile => return,
    };

    while let Some(item) = subscription.next().await {
        let records = match item {
            Ok(records) => records,
            Err(e) => {
                error!("Subscription to {} failed: {}", collection, e);
                if state.is_current() {
                    state.status.send_modify(|status| *status = status.on_failure());
                }
                return;
            }
        };

        // The epoch check and the loaded flag happen under the data lock, so
        // a detach cannot interleave with them
        let applied = state.data.send_if_modified(|current| {
            if !state.is_current() {
                return false;
            }
            let mut next = HabitData::clone(&**current);
            match collection {
                Collection::Logs => next.logs = decode(collection, records),
                _ => next.habits = decode(collection, records),
            }
            *current = Arc::new(next);
            state.loaded.send_modify(|loaded| *loaded |= loaded_bit);
            true
        });

        if applied {
            state.status.send_if_modified(|status| {
                let next = status.on_snapshot();
                let changed = next != *status;
                *status = next;
                changed
            });
        }
    }
}

/// Decode a snapshot, skipping records that do not parse
fn decode<T: DeserializeOwned>(collection: Collection, records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping undecodable record in {}: {}", collection, e);
                None
            }
        })
        .collect()
}
