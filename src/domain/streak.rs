//! Streak calculation
//!
//! A streak is the number of consecutive calendar days, ending today or
//! yesterday, on which a habit has a log. A habit not yet done today keeps
//! its streak; a habit that missed yesterday entirely has none.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::{HabitId, Log};

/// Calculated streak information for a habit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streak {
    /// Which habit this streak data is for
    pub habit_id: HabitId,
    /// Current consecutive days completed
    pub current_streak: u32,
    /// When the habit was last completed (None if never completed)
    pub last_completed: Option<NaiveDate>,
    /// Number of distinct days this habit has been completed
    pub total_completions: u32,
}

impl Streak {
    /// Create a new streak record with zero values
    pub fn new(habit_id: HabitId) -> Self {
        Self {
            habit_id,
            current_streak: 0,
            last_completed: None,
            total_completions: 0,
        }
    }

    /// Calculate streak information for one habit from the full log collection
    ///
    /// Logs belonging to other habits are ignored.
    pub fn calculate_from_logs(habit_id: HabitId, logs: &[Log], today: NaiveDate) -> Self {
        let dates: BTreeSet<NaiveDate> = logs
            .iter()
            .filter(|log| log.habit_id == habit_id)
            .map(|log| log.date)
            .collect();

        if dates.is_empty() {
            return Self::new(habit_id);
        }

        Self {
            current_streak: current_streak(&dates, today),
            last_completed: dates.iter().next_back().copied(),
            total_completions: dates.len() as u32,
            habit_id,
        }
    }

    /// Whether the streak is still alive (done today or yesterday)
    pub fn is_on_track(&self) -> bool {
        self.current_streak > 0
    }
}

/// Count consecutive logged days ending today, or ending yesterday when
/// today has not been logged yet
pub fn current_streak(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    if dates.is_empty() {
        return 0;
    }

    let mut checking_date = today;
    if !dates.contains(&today) {
        checking_date = today - Duration::days(1);
        if !dates.contains(&checking_date) {
            return 0;
        }
    }

    let mut streak = 0;
    while dates.contains(&checking_date) {
        streak += 1;
        checking_date = match checking_date.pred_opt() {
            Some(previous) => previous,
            None => break,
        };
    }

    streak
}
