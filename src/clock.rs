//! Date and time utilities
//!
//! Every "today" and "now" in the crate comes from a [`Clock`], so the
//! statistics and the reminder check can be driven by a fixed instant in
//! tests. Days are local wall-clock dates.

use std::sync::Mutex;

use chrono::{
    DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeZone, Timelike, Utc,
};

use crate::domain::ReminderTime;

/// Source of the current local time
pub trait Clock: Send + Sync {
    /// The current instant, carrying the local UTC offset
    fn now(&self) -> DateTime<FixedOffset>;

    /// Interpret a local wall-clock date and time as an instant
    fn localize(&self, naive: NaiveDateTime) -> DateTime<FixedOffset>;

    /// Today as a calendar date
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// The current clock minute, as compared against reminder times
    fn current_minute(&self) -> ReminderTime {
        let now = self.now();
        ReminderTime::clamped(now.hour(), now.minute())
    }

    /// Combine a calendar date and a clock time into an instant
    fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
        self.localize(date.and_time(time))
    }
}

/// The machine's local clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn localize(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        // Inside a DST gap there is no such local time; fall back to the
        // current offset so the wall-clock reading is preserved.
        match Local.from_local_datetime(&naive).earliest() {
            Some(dt) => dt.fixed_offset(),
            None => {
                let offset = *self.now().offset();
                offset
                    .from_local_datetime(&naive)
                    .single()
                    .unwrap_or_else(|| Utc.from_utc_datetime(&naive).fixed_offset())
            }
        }
    }
}

/// A clock frozen at a settable instant
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Parse an RFC 3339 instant such as `2024-03-10T08:00:00+07:00`
    pub fn at_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self::new(DateTime::parse_from_rfc3339(s)?))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn localize(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        let offset = *self.now().offset();
        offset
            .from_local_datetime(&naive)
            .single()
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive).fixed_offset())
    }
}

/// ISO 8601 instant in UTC with millisecond precision (`2024-03-10T01:00:00.000Z`)
pub fn iso_timestamp<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
