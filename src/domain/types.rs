//! Core types used throughout the domain layer
//!
//! This module defines the identifier newtypes, the reminder time, icon and
//! color value types, and the calendar month type used by the statistics.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainError;

/// Unique identifier for a habit
///
/// Ids are opaque strings. New habits get a random UUID, but any string
/// loaded from a store is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(pub String);

impl HabitId {
    /// Generate a new random habit ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HabitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a completion log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(pub String);

impl LogId {
    /// The key of the single log a habit may have on a given day.
    ///
    /// Toggling and backfilling address this key, which lets the store apply
    /// them as one keyed operation instead of a client-side lookup.
    pub fn for_day(habit_id: &HabitId, date: NaiveDate) -> Self {
        Self(format!("{}_{}", habit_id, date.format("%Y-%m-%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity that owns a set of collections
///
/// Both collections are scoped per owner; there is no cross-owner visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Owner key for a user inside an application namespace
    pub fn scoped(app_id: &str, user_id: &str) -> Self {
        Self(format!("artifacts/{}/users/{}", app_id, user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local wall-clock minute at which a reminder fires ("HH:MM")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, DomainError> {
        if hour > 23 || minute > 59 {
            return Err(DomainError::InvalidReminderTime(format!(
                "{:02}:{:02} is not a valid time of day",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Build from clock readings, which are always in range
    pub(crate) fn clamped(hour: u32, minute: u32) -> Self {
        Self {
            hour: hour.min(23) as u8,
            minute: minute.min(59) as u8,
        }
    }

    /// The time of day this reminder fires at
    pub fn as_time(&self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or_default()
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl FromStr for ReminderTime {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidReminderTime(format!("expected HH:MM, got '{}'", s));

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Glyph tag shown next to a habit
///
/// Purely presentational. Unknown or missing tags resolve to `Activity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HabitIcon {
    #[default]
    Activity,
    Heart,
    BookOpen,
    Coffee,
    Dumbbell,
    Droplets,
    Moon,
    Sun,
    Briefcase,
    Smile,
    Star,
    Zap,
    Apple,
    Brain,
    Timer,
    CheckCircle2,
}

impl HabitIcon {
    pub const ALL: [HabitIcon; 16] = [
        HabitIcon::Activity,
        HabitIcon::Heart,
        HabitIcon::BookOpen,
        HabitIcon::Coffee,
        HabitIcon::Dumbbell,
        HabitIcon::Droplets,
        HabitIcon::Moon,
        HabitIcon::Sun,
        HabitIcon::Briefcase,
        HabitIcon::Smile,
        HabitIcon::Star,
        HabitIcon::Zap,
        HabitIcon::Apple,
        HabitIcon::Brain,
        HabitIcon::Timer,
        HabitIcon::CheckCircle2,
    ];

    /// The tag persisted with the habit
    pub fn tag(&self) -> &'static str {
        match self {
            HabitIcon::Activity => "Activity",
            HabitIcon::Heart => "Heart",
            HabitIcon::BookOpen => "BookOpen",
            HabitIcon::Coffee => "Coffee",
            HabitIcon::Dumbbell => "Dumbbell",
            HabitIcon::Droplets => "Droplets",
            HabitIcon::Moon => "Moon",
            HabitIcon::Sun => "Sun",
            HabitIcon::Briefcase => "Briefcase",
            HabitIcon::Smile => "Smile",
            HabitIcon::Star => "Star",
            HabitIcon::Zap => "Zap",
            HabitIcon::Apple => "Apple",
            HabitIcon::Brain => "Brain",
            HabitIcon::Timer => "Timer",
            HabitIcon::CheckCircle2 => "CheckCircle2",
        }
    }

    /// Resolve a stored tag, falling back to the default glyph
    pub fn from_tag(tag: Option<&str>) -> Self {
        tag.and_then(|t| Self::ALL.iter().copied().find(|icon| icon.tag() == t))
            .unwrap_or_default()
    }
}

/// Display color of a habit, as a CSS hex string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitColor(String);

impl HabitColor {
    pub const DEFAULT: &'static str = "#3b82f6";

    /// Accepts `#RGB` and `#RRGGBB`
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        let valid = trimmed
            .strip_prefix('#')
            .map(|hex| (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false);

        if !valid {
            return Err(DomainError::InvalidColor(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HabitColor {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for HabitColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A calendar month ("YYYY-MM")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(DomainError::InvalidDate(format!("{}-{:02} is not a valid month", year, month)));
        }
        Ok(Self { year, month })
    }

    /// The month containing `date`
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Number of days in this month, 28 through 31
    pub fn days_in_month(&self) -> u32 {
        match self.month {
            4 | 6 | 9 | 11 => 30,
            2 if NaiveDate::from_ymd_opt(self.year, 2, 29).is_some() => 29,
            2 => 28,
            _ => 31,
        }
    }

    /// Weekday of the 1st
    pub fn first_weekday(&self) -> Weekday {
        self.first_day().weekday()
    }

    /// The `day`th of this month, if it exists
    pub fn day(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (1..=self.days_in_month()).filter_map(move |d| self.day(d))
    }

    /// The following month
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// The preceding month
    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }
}

impl FromStr for YearMonth {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidDate(format!("expected YYYY-MM, got '{}'", s));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(s: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| DomainError::InvalidDate(format!("expected YYYY-MM-DD, got '{}'", s)))
}
