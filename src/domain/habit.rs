//! Habit entity and related functionality
//!
//! This module defines the Habit record as it is persisted, and the
//! HabitDraft that carries the user-editable fields through validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, HabitColor, HabitIcon, HabitId, ReminderTime};

/// A habit represents something the user wants to do every day
///
/// `id` and `created_at` are assigned once at creation and never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    /// Unique identifier for this habit
    pub id: HabitId,
    /// Display name (e.g., "Drink water")
    pub name: String,
    /// Color used to group the habit visually
    #[serde(default)]
    pub color: HabitColor,
    /// When this habit was created
    pub created_at: DateTime<Utc>,
    /// Optional daily reminder minute
    #[serde(default)]
    pub reminder_time: Option<ReminderTime>,
    /// Raw glyph tag, kept verbatim so unknown tags survive a round trip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Habit {
    /// Create a new habit from validated draft fields
    pub fn new(draft: HabitDraft, created_at: DateTime<Utc>) -> Result<Self, DomainError> {
        Self::with_id(HabitId::new(), draft, created_at)
    }

    /// Build a habit under a known id (used for in-place edits)
    pub fn with_id(
        id: HabitId,
        draft: HabitDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = HabitDraft::validate_name(&draft.name)?;

        Ok(Self {
            id,
            name,
            color: draft.color,
            created_at,
            reminder_time: draft.reminder_time,
            icon: draft.icon,
        })
    }

    /// Resolved glyph for presentation
    pub fn icon(&self) -> HabitIcon {
        HabitIcon::from_tag(self.icon.as_deref())
    }

    /// The editable fields of this habit, e.g. to pre-fill an edit form
    pub fn draft(&self) -> HabitDraft {
        HabitDraft {
            name: self.name.clone(),
            color: self.color.clone(),
            reminder_time: self.reminder_time,
            icon: self.icon.clone(),
        }
    }
}

/// User-editable habit fields
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HabitDraft {
    pub name: String,
    pub color: HabitColor,
    pub reminder_time: Option<ReminderTime>,
    /// Raw glyph tag, unknown tags included
    pub icon: Option<String>,
}

impl HabitDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: HabitColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_reminder(mut self, time: ReminderTime) -> Self {
        self.reminder_time = Some(time);
        self
    }

    pub fn with_icon(mut self, icon: HabitIcon) -> Self {
        self.icon = Some(icon.tag().to_string());
        self
    }

    /// Validate habit name according to business rules, returning it trimmed
    pub fn validate_name(name: &str) -> Result<String, DomainError> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(DomainError::InvalidHabitName(
                "Habit name cannot be empty".to_string(),
            ));
        }

        if trimmed.chars().count() > 100 {
            return Err(DomainError::InvalidHabitName(
                "Habit name cannot be longer than 100 characters".to_string(),
            ));
        }

        Ok(trimmed.to_string())
    }
}
