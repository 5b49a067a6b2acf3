//! Reminder scheduler
//!
//! Once per period the scheduler compares the current clock minute with
//! every habit's reminder time. A habit whose reminder matches and that has
//! no log today gets a toast, plus a system notification when permission
//! was granted. Each (day, minute) is checked once, so a period shorter than
//! a minute cannot repeat a reminder; nothing is persisted beyond that.
//! Ticks missed while the host was suspended are skipped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::{HabitId, ReminderTime};
use crate::i18n::Lang;
use crate::repository::HabitData;

/// How long a toast stays visible
pub const TOAST_TTL: Duration = Duration::from_secs(5);

/// Default period between checks
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Whether system notifications may be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    /// Not asked yet
    #[default]
    Default,
    Granted,
    Denied,
}

/// A reminder that is due now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub habit_id: HabitId,
    pub title: String,
    pub body: String,
}

/// Habits whose reminder is `minute` and that are not done on `today`
pub fn due_reminders(
    data: &HabitData,
    today: NaiveDate,
    minute: ReminderTime,
    lang: Lang,
) -> Vec<Reminder> {
    data.habits
        .iter()
        .filter(|habit| habit.reminder_time == Some(minute))
        .filter(|habit| !data.is_done(&habit.id, today))
        .map(|habit| Reminder {
            habit_id: habit.id.clone(),
            title: lang.reminder_title().to_string(),
            body: lang.reminder_body(&habit.name),
        })
        .collect()
}

/// Where reminders are shown
pub trait NotificationSink: Send + Sync {
    /// Transient in-app message
    fn show_toast(&self, message: &str);

    /// System-level notification
    fn show_notification(&self, title: &str, body: &str);
}

/// Sink that writes reminders to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn show_toast(&self, message: &str) {
        info!("{}", message);
    }

    fn show_notification(&self, title: &str, body: &str) {
        info!("[{}] {}", title, body);
    }
}

/// A visible toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: String,
    pub message: String,
    expires_at: Instant,
}

/// Toasts that expire on their own
#[derive(Debug)]
pub struct ToastQueue {
    ttl: Duration,
    toasts: Mutex<VecDeque<Toast>>,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(TOAST_TTL)
    }
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            toasts: Mutex::new(VecDeque::new()),
        }
    }

    /// Show a message, returning the toast id
    pub fn push(&self, message: impl Into<String>) -> String {
        let toast = Toast {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
            expires_at: Instant::now() + self.ttl,
        };
        let id = toast.id.clone();
        self.toasts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(toast);
        id
    }

    /// Toasts that have not expired yet, oldest first
    pub fn active(&self) -> Vec<Toast> {
        let now = Instant::now();
        let mut toasts = self.toasts.lock().unwrap_or_else(|e| e.into_inner());
        toasts.retain(|toast| toast.expires_at > now);
        toasts.iter().cloned().collect()
    }
}

/// Periodic reminder check over the repository's live snapshot
pub struct ReminderScheduler {
    clock: Arc<dyn Clock>,
    data: watch::Receiver<Arc<HabitData>>,
    sink: Arc<dyn NotificationSink>,
    toasts: Arc<ToastQueue>,
    permission: NotificationPermission,
    lang: Lang,
    period: Duration,
    /// Day and minute of the last check that ran
    last_checked: Mutex<Option<(NaiveDate, ReminderTime)>>,
}

impl ReminderScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        data: watch::Receiver<Arc<HabitData>>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            clock,
            data,
            sink,
            toasts: Arc::new(ToastQueue::default()),
            permission: NotificationPermission::Default,
            lang: Lang::default(),
            period: DEFAULT_PERIOD,
            last_checked: Mutex::new(None),
        }
    }

    pub fn with_permission(mut self, permission: NotificationPermission) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn toasts(&self) -> Arc<ToastQueue> {
        Arc::clone(&self.toasts)
    }

    /// Run one check and emit whatever is due
    ///
    /// A minute is checked at most once per day, however short the period.
    pub fn tick(&self) -> Vec<Reminder> {
        let minute = self.clock.current_minute();
        let today = self.clock.today();
        {
            let mut last = self.last_checked.lock().unwrap_or_else(|e| e.into_inner());
            if *last == Some((today, minute)) {
                debug!("Reminder check at {} already done", minute);
                return Vec::new();
            }
            *last = Some((today, minute));
        }

        let due = {
            let data = self.data.borrow();
            due_reminders(&data, today, minute, self.lang)
        };

        debug!("Reminder check at {}: {} due", minute, due.len());

        for reminder in &due {
            self.toasts.push(reminder.body.clone());
            self.sink.show_toast(&reminder.body);
            if self.permission == NotificationPermission::Granted {
                self.sink.show_notification(&reminder.title, &reminder.body);
            }
        }

        due
    }

    /// Check every period until `shutdown` flips to true
    ///
    /// The first check happens one period after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Reminder scheduler started, checking every {:?}", self.period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reminder scheduler stopped");
    }
}
