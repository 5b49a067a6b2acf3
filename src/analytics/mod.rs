//! Streak and statistics engine
//!
//! Every function here is pure: it reads one committed snapshot of habits
//! and logs plus a reference "today", and never touches the store.
//!
//! Counts are literal. Every log dated on a day counts toward that day,
//! including logs whose habit has since been deleted.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::domain::{current_streak, HabitId, Log, Streak, YearMonth};
use crate::i18n::Lang;
use crate::repository::HabitData;

/// Completions on one day of a month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    /// Day of month, starting at 1
    pub day: u32,
    pub date: NaiveDate,
    pub count: usize,
}

/// Completions on one of the last seven days
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekdayCount {
    /// Localized short weekday name
    pub label: &'static str,
    pub date: NaiveDate,
    pub count: usize,
}

/// One cell of the month calendar
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarCell<'a> {
    /// Blank cell before the 1st of the month
    Padding,
    Day { date: NaiveDate, logs: Vec<&'a Log> },
}

impl CalendarCell<'_> {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            CalendarCell::Padding => None,
            CalendarCell::Day { date, .. } => Some(*date),
        }
    }
}

/// Which habits a calendar shows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HabitFilter {
    #[default]
    All,
    Habit(HabitId),
}

impl HabitFilter {
    fn accepts(&self, log: &Log) -> bool {
        match self {
            HabitFilter::All => true,
            HabitFilter::Habit(id) => &log.habit_id == id,
        }
    }
}

/// Dashboard figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    /// Logs dated in the current month
    pub total_month: usize,
    /// Today's completion rate in whole percent
    pub rate: u32,
    pub today_completed: usize,
    pub habit_count: usize,
    /// Longest current streak over all habits
    pub max_streak: u32,
}

/// Statistics over one snapshot
pub struct StatsEngine<'a> {
    data: &'a HabitData,
    today: NaiveDate,
}

impl<'a> StatsEngine<'a> {
    pub fn new(data: &'a HabitData, today: NaiveDate) -> Self {
        Self { data, today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Consecutive days completed, ending today or yesterday
    pub fn current_streak(&self, habit_id: &HabitId) -> u32 {
        current_streak(&self.data.dates_for(habit_id), self.today)
    }

    /// Full streak record for one habit
    pub fn streak(&self, habit_id: &HabitId) -> Streak {
        Streak::calculate_from_logs(habit_id.clone(), &self.data.logs, self.today)
    }

    /// Logs dated today as a whole percentage of the habit count
    ///
    /// Zero when there are no habits. May exceed 100 when logs of deleted
    /// habits are dated today.
    pub fn daily_completion_rate(&self) -> u32 {
        let habit_count = self.data.habits.len();
        if habit_count == 0 {
            return 0;
        }

        let completed = self.data.logs_on(self.today).count();
        (completed as f64 / habit_count as f64 * 100.0).round() as u32
    }

    pub fn monthly_total(&self, month: YearMonth) -> usize {
        self.data
            .logs
            .iter()
            .filter(|log| month.contains(log.date))
            .count()
    }

    /// One entry per calendar day of `month`, zero-filled
    pub fn per_day_counts(&self, month: YearMonth) -> Vec<DayCount> {
        month
            .days()
            .enumerate()
            .map(|(index, date)| DayCount {
                day: index as u32 + 1,
                date,
                count: self.data.logs_on(date).count(),
            })
            .collect()
    }

    /// The last seven days ending today, oldest first
    pub fn weekly_counts(&self, lang: Lang) -> Vec<WeekdayCount> {
        (0..7)
            .rev()
            .map(|days_ago| {
                let date = self.today - Duration::days(days_ago);
                WeekdayCount {
                    label: lang.weekday_short(date.weekday()),
                    date,
                    count: self.data.logs_on(date).count(),
                }
            })
            .collect()
    }

    /// Padding cells up to the weekday of the 1st (Sunday first), then one
    /// cell per day carrying that day's logs
    pub fn calendar_month_grid(&self, month: YearMonth, filter: &HabitFilter) -> Vec<CalendarCell<'a>> {
        let padding = month.first_weekday().num_days_from_sunday() as usize;
        let data = self.data;

        let mut cells = Vec::with_capacity(padding + month.days_in_month() as usize);
        cells.extend(std::iter::repeat_with(|| CalendarCell::Padding).take(padding));
        cells.extend(month.days().map(|date| CalendarCell::Day {
            date,
            logs: data
                .logs_on(date)
                .filter(|log| filter.accepts(log))
                .collect(),
        }));
        cells
    }

    pub fn summary(&self) -> StatsSummary {
        let max_streak = self
            .data
            .habits
            .iter()
            .map(|habit| self.current_streak(&habit.id))
            .max()
            .unwrap_or(0);

        StatsSummary {
            total_month: self.monthly_total(YearMonth::of(self.today)),
            rate: self.daily_completion_rate(),
            today_completed: self.data.logs_on(self.today).count(),
            habit_count: self.data.habits.len(),
            max_streak,
        }
    }
}
