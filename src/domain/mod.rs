//! Domain module containing core business logic and data types
//!
//! This module defines the core entities (Habit, Log) and the streak rule
//! that every statistic builds on. These types represent the fundamental
//! concepts in our habit tracking system.

pub mod habit;
pub mod log;
pub mod streak;
pub mod types;

// Re-export public types for easy access
pub use habit::*;
pub use log::*;
pub use streak::*;
pub use types::*;

use thiserror::Error;

/// Errors that can occur during domain operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid habit name: {0}")]
    InvalidHabitName(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid reminder time: {0}")]
    InvalidReminderTime(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),
}
