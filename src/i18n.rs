//! Display language and the few user-facing strings the core produces

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Supported display languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    /// Indonesian
    #[default]
    Id,
}

impl Lang {
    pub fn code(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Id => "id",
        }
    }

    /// Short weekday name as shown on the weekly chart
    pub fn weekday_short(&self, weekday: Weekday) -> &'static str {
        let index = weekday.num_days_from_sunday() as usize;
        match self {
            Lang::En => ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"][index],
            Lang::Id => ["Min", "Sen", "Sel", "Rab", "Kam", "Jum", "Sab"][index],
        }
    }

    /// Title of a reminder notification
    pub fn reminder_title(&self) -> &'static str {
        match self {
            Lang::En => "Reminder",
            Lang::Id => "Pengingat",
        }
    }

    /// Body of a reminder for `habit_name`
    pub fn reminder_body(&self, habit_name: &str) -> String {
        match self {
            Lang::En => format!("It's time for {}", habit_name),
            Lang::Id => format!("Waktunya {}", habit_name),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Lang::En),
            "id" => Ok(Lang::Id),
            other => Err(format!("Unsupported language '{}'. Valid options: en, id", other)),
        }
    }
}
