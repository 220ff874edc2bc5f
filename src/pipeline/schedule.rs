// src/pipeline/schedule.rs

//! Weekly schedule operation.

use super::FetchOptions;
use crate::cache::{SCHEDULE_PREFIX, cache_key};
use crate::context::PortalContext;
use crate::error::Result;
use crate::http::fetch_target_page;
use crate::models::{Credentials, WeeklySchedule};
use crate::services::parse_schedule;

pub async fn get_weekly_schedule(
    ctx: &PortalContext,
    credentials: &Credentials,
) -> Result<WeeklySchedule> {
    get_weekly_schedule_with(ctx, credentials, FetchOptions::default()).await
}

/// Fetch the user's weekly schedule, reading through the cache.
///
/// An empty schedule is returned as-is and never cached.
pub async fn get_weekly_schedule_with(
    ctx: &PortalContext,
    credentials: &Credentials,
    options: FetchOptions,
) -> Result<WeeklySchedule> {
    let key = cache_key(SCHEDULE_PREFIX, &credentials.username, None);

    if !options.force_refresh {
        if let Some(schedule) = ctx.cache.get_json::<WeeklySchedule>(&key).await {
            log::info!("Serving schedule for {} from cache", credentials.username);
            return Ok(schedule);
        }
    }

    log::info!("Fetching schedule for {}", credentials.username);
    let session = ctx.sessions.create_session(credentials)?;
    let (_, page) = fetch_target_page(
        session.as_ref(),
        &ctx.config.portal.schedule_url,
        ctx.config.http.timeout(),
        "schedule page",
    )
    .await?;

    let schedule = parse_schedule(&page.body);
    if schedule.is_empty() {
        log::warn!("No schedule days parsed for {}", credentials.username);
        return Ok(schedule);
    }

    ctx.cache
        .set_json(&key, &schedule, ctx.config.cache.long_ttl())
        .await;
    log::info!(
        "Parsed {} schedule days for {}",
        schedule.len(),
        credentials.username
    );
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::models::{Period, Weekday};
    use crate::testing::{ScriptedProvider, ScriptedSession, test_config};

    const PAGE: &str = "<table id='ContentPlaceHolderright_ContentPlaceHoldercontent_XtblSched'>\
        <tr id='ContentPlaceHolderright_ContentPlaceHoldercontent_Xrw1'>\
        <td>Sunday</td><td>Free</td><td><b>CSEN 401 Tut H14</b></td></tr></table>";

    fn context(session: Arc<ScriptedSession>) -> (PortalContext, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(session));
        let ctx = PortalContext::new(
            Arc::new(test_config()),
            provider.clone(),
            Cache::new(Arc::new(MemoryCache::new(8))),
        );
        (ctx, provider)
    }

    #[tokio::test]
    async fn test_schedule_cached_after_fetch() {
        let session = Arc::new(ScriptedSession::new());
        session.push_body(PAGE);
        let (ctx, provider) = context(session.clone());
        let creds = Credentials::new("student", "pw");

        let first = get_weekly_schedule(&ctx, &creds).await.unwrap();
        let second = get_weekly_schedule(&ctx, &creds).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[&Weekday::Sunday][&Period::Second].location, "H14");
        assert_eq!(provider.sessions_created(), 1);
        assert_eq!(session.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_schedule_not_cached() {
        let session = Arc::new(ScriptedSession::new());
        session.push_body("<html><body>nothing</body></html>");
        session.push_body(PAGE);
        let (ctx, _) = context(session.clone());
        let creds = Credentials::new("student", "pw");

        assert!(get_weekly_schedule(&ctx, &creds).await.unwrap().is_empty());
        assert_eq!(get_weekly_schedule(&ctx, &creds).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let session = Arc::new(ScriptedSession::new());
        session.push_body(PAGE);
        session.push_body(PAGE);
        let (ctx, _) = context(session.clone());
        let creds = Credentials::new("student", "pw");

        get_weekly_schedule(&ctx, &creds).await.unwrap();
        get_weekly_schedule_with(&ctx, &creds, FetchOptions::refresh())
            .await
            .unwrap();
        assert_eq!(session.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_surfaces() {
        let session = Arc::new(ScriptedSession::new());
        session.push_body("Login Failed!");
        let (ctx, _) = context(session);

        let err = get_weekly_schedule(&ctx, &Credentials::new("student", "bad"))
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
    }
}
