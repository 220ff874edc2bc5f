//! Service layer for the portal scraper.
//!
//! This module contains the page-level logic for:
//! - Schedule grid parsing (`parse_schedule`, `extract_cell`)
//! - Attendance postbacks (`PostbackClient`, `fetch_attendance`)
//! - Course content and announcements (`fetch_course_content`, `fetch_course_announcement`)

pub mod attendance;
pub mod content;
pub mod form;
pub mod schedule;

pub use attendance::{PostbackClient, fetch_attendance, lookup_absence_level};
pub use content::{fetch_course_announcement, fetch_course_content};
pub use form::FormState;
pub use schedule::{extract_cell, parse_schedule};
