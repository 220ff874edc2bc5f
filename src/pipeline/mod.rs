//! Operation entry points.
//!
//! Each operation is a cache-aside flow over a [`PortalContext`](crate::context::PortalContext):
//!
//! - `get_weekly_schedule`: group schedule grid
//! - `get_attendance`: per-course attendance via postbacks
//! - `get_combined_course_content`: announcement and weeks of one course
//!
//! The `*_with` variants take [`FetchOptions`].

pub mod attendance;
pub mod content;
pub mod schedule;

pub use attendance::{get_attendance, get_attendance_with};
pub use content::{get_combined_course_content, get_combined_course_content_with};
pub use schedule::{get_weekly_schedule, get_weekly_schedule_with};

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache read. The fresh result still replaces the cached one.
    pub force_refresh: bool,
}

impl FetchOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}
