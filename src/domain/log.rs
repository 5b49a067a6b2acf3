//! Completion log records
//!
//! A Log records that a habit was completed on a calendar day. The `date`
//! is the day bucket used by every statistic; `timestamp` is the precise
//! instant the completion was recorded or backfilled to.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::{HabitId, LogId};

/// One recorded completion of a habit on a specific calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub id: LogId,
    /// Not enforced as a foreign key; logs may outlive their habit
    pub habit_id: HabitId,
    /// Local, timezone-naive day bucket
    pub date: NaiveDate,
    pub timestamp: DateTime<FixedOffset>,
}

impl Log {
    /// Create the log for `habit_id` on `date`, under its day key
    pub fn for_day(habit_id: HabitId, date: NaiveDate, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            id: LogId::for_day(&habit_id, date),
            habit_id,
            date,
            timestamp,
        }
    }

    /// Whether this log was written under the day key rather than a legacy id
    pub fn has_day_key(&self) -> bool {
        self.id == LogId::for_day(&self.habit_id, self.date)
    }
}
