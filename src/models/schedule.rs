//! Weekly schedule data structures.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel for a field that could not be parsed.
pub const UNKNOWN: &str = "Unknown";

/// Sentinel for a slot with no class.
pub const FREE: &str = "Free";

/// Kind of class held in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionType {
    Lecture,
    Tut,
    Lab,
    #[default]
    Unknown,
    Free,
}

impl SessionType {
    /// Classify free text by case-insensitive keyword.
    ///
    /// `Lecture` is checked first, then `Tut`, then `Lab`.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("lecture") {
            Self::Lecture
        } else if lower.contains("tut") {
            Self::Tut
        } else if lower.contains("lab") {
            Self::Lab
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lecture => "Lecture",
            Self::Tut => "Tut",
            Self::Lab => "Lab",
            Self::Unknown => UNKNOWN,
            Self::Free => FREE,
        };
        f.write_str(s)
    }
}

/// One parsed schedule grid cell.
///
/// A free slot carries the `Free` sentinel in every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    #[serde(rename = "Course_Name")]
    pub course_name: String,

    #[serde(rename = "Type")]
    pub session_type: SessionType,

    #[serde(rename = "Location")]
    pub location: String,

    #[serde(rename = "Free", default)]
    pub free: bool,
}

impl CellRecord {
    /// A record with every field set to `Unknown`.
    pub fn unknown() -> Self {
        Self {
            course_name: UNKNOWN.to_string(),
            session_type: SessionType::Unknown,
            location: UNKNOWN.to_string(),
            free: false,
        }
    }

    /// A free slot.
    pub fn free() -> Self {
        Self {
            course_name: FREE.to_string(),
            session_type: SessionType::Free,
            location: FREE.to_string(),
            free: true,
        }
    }

    /// Whether every field still holds the `Unknown` sentinel.
    pub fn is_unknown(&self) -> bool {
        !self.free
            && self.course_name == UNKNOWN
            && self.session_type == SessionType::Unknown
            && self.location == UNKNOWN
    }
}

impl Default for CellRecord {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Teaching period, in grid column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "First Period")]
    First,
    #[serde(rename = "Second Period")]
    Second,
    #[serde(rename = "Third Period")]
    Third,
    #[serde(rename = "Fourth Period")]
    Fourth,
    #[serde(rename = "Fifth Period")]
    Fifth,
}

impl Period {
    /// All periods in grid order.
    pub const ALL: [Period; 5] = [
        Period::First,
        Period::Second,
        Period::Third,
        Period::Fourth,
        Period::Fifth,
    ];
}

/// Working day of the portal's week, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Saturday,
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
}

impl Weekday {
    /// Canonical day sequence.
    pub const ALL: [Weekday; 6] = [
        Weekday::Saturday,
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
    ];

    /// Match a grid day label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(label))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
        }
    }
}

/// Periods of a single day. Always holds all five periods once assembled.
pub type DaySchedule = BTreeMap<Period, CellRecord>;

/// Days of the week in canonical order.
pub type WeeklySchedule = BTreeMap<Weekday, DaySchedule>;
