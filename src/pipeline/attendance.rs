//! Attendance operation.

use super::FetchOptions;
use crate::cache::{ATTENDANCE_PREFIX, cache_key};
use crate::context::PortalContext;
use crate::error::Result;
use crate::models::{AttendanceReport, Credentials};
use crate::services::fetch_attendance;

pub async fn get_attendance(
    ctx: &PortalContext,
    credentials: &Credentials,
) -> Result<AttendanceReport> {
    get_attendance_with(ctx, credentials, FetchOptions::default()).await
}

/// Fetch attendance for every course, reading through the cache.
pub async fn get_attendance_with(
    ctx: &PortalContext,
    credentials: &Credentials,
    options: FetchOptions,
) -> Result<AttendanceReport> {
    let key = cache_key(ATTENDANCE_PREFIX, &credentials.username, None);

    if !options.force_refresh {
        if let Some(report) = ctx.cache.get_json::<AttendanceReport>(&key).await {
            log::info!("Serving attendance for {} from cache", credentials.username);
            return Ok(report);
        }
    }

    log::info!("Fetching attendance for {}", credentials.username);
    let session = ctx.sessions.create_session(credentials)?;
    let report = fetch_attendance(
        session.as_ref(),
        &ctx.config.portal.attendance_url,
        ctx.config.http.timeout(),
        ctx.config.http.postback_delay(),
    )
    .await?;

    if report.is_empty() {
        log::warn!("No attendance courses found for {}", credentials.username);
    } else {
        ctx.cache
            .set_json(&key, &report, ctx.config.cache.default_ttl())
            .await;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::testing::{ScriptedProvider, ScriptedSession, attendance_page, course_page, test_config};

    #[tokio::test]
    async fn test_attendance_cached() {
        let session = Arc::new(ScriptedSession::new());
        session.push_body(&attendance_page("vs0", &[("1", "Course A")], &[("Course A", "3")]));
        session.push_body(&course_page("vs1", &[("1", "Absent", "Lecture 1")]));

        let cache = Cache::new(Arc::new(MemoryCache::new(8)));
        let ctx = PortalContext::new(
            Arc::new(test_config()),
            Arc::new(ScriptedProvider::new(session.clone())),
            cache.clone(),
        );
        let creds = Credentials::new("student", "pw");

        let report = get_attendance(&ctx, &creds).await.unwrap();
        assert_eq!(report["Course A"].absence_level, "Level 3");

        let cached: AttendanceReport = cache.get_json("attendance:student").await.unwrap();
        assert_eq!(cached, report);

        let again = get_attendance(&ctx, &creds).await.unwrap();
        assert_eq!(again, report);
        assert_eq!(session.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_report_not_cached() {
        let session = Arc::new(ScriptedSession::new());
        session.push_body(&attendance_page("vs0", &[], &[]));

        let cache = Cache::new(Arc::new(MemoryCache::new(8)));
        let ctx = PortalContext::new(
            Arc::new(test_config()),
            Arc::new(ScriptedProvider::new(session)),
            cache.clone(),
        );

        let report = get_attendance(&ctx, &Credentials::new("student", "pw"))
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(cache.get_json::<AttendanceReport>("attendance:student").await, None);
    }
}
