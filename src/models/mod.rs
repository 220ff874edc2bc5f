// src/models/mod.rs

//! Domain models for the portal scraper.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod attendance;
mod config;
mod content;
mod credentials;
mod schedule;

// Re-export all public types
pub use attendance::{
    AbsenceSummary, AttendanceReport, AttendanceSession, CourseAttendance, NO_WARNING_LEVEL,
};
pub use config::{AuthScheme, CacheBackend, CacheConfig, Config, HttpConfig, PortalConfig};
pub use content::{AnnouncementItem, CombinedContent, ContentEntry, ContentItem, WeekItem};
pub use credentials::Credentials;
pub use schedule::{
    CellRecord, DaySchedule, FREE, Period, SessionType, UNKNOWN, WeeklySchedule, Weekday,
};
