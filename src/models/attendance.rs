//! Attendance data structures.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Level reported when a course has no absence warning.
pub const NO_WARNING_LEVEL: &str = "No Warning Level";

/// One attended (or missed) session of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub status: Option<String>,

    #[serde(rename = "session")]
    pub session_label: Option<String>,
}

/// Absence level per normalized course name.
pub type AbsenceSummary = HashMap<String, String>;

/// Attendance for a single course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAttendance {
    pub absence_level: String,
    pub sessions: Vec<AttendanceSession>,
}

impl CourseAttendance {
    /// Entry for a course whose detail page could not be read.
    pub fn without_sessions(absence_level: impl Into<String>) -> Self {
        Self {
            absence_level: absence_level.into(),
            sessions: Vec::new(),
        }
    }
}

/// Attendance keyed by the raw dropdown label of each course.
pub type AttendanceReport = BTreeMap<String, CourseAttendance>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_wire_names() {
        let session = AttendanceSession {
            status: Some("Attended".to_string()),
            session_label: Some("Lecture 3".to_string()),
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["status"], "Attended");
        assert_eq!(value["session"], "Lecture 3");
    }

    #[test]
    fn test_without_sessions() {
        let entry = CourseAttendance::without_sessions("Level 1");
        assert_eq!(entry.absence_level, "Level 1");
        assert!(entry.sessions.is_empty());
    }
}
