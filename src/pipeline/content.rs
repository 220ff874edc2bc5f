// src/pipeline/content.rs

//! Combined course content operation.
//!
//! Content and announcement are fetched concurrently over one session. Each
//! branch has its own deadline and neither cancels the other; the results
//! are merged once both have finished.

use std::future::Future;
use std::time::Duration;

use super::FetchOptions;
use crate::cache::{CONTENT_PREFIX, cache_key};
use crate::context::PortalContext;
use crate::error::{AppError, Result};
use crate::models::{AnnouncementItem, CombinedContent, ContentItem, Credentials, WeekItem};
use crate::services::{fetch_course_announcement, fetch_course_content};
use crate::utils::url::normalize_course_url;

pub async fn get_combined_course_content(
    ctx: &PortalContext,
    credentials: &Credentials,
    course_url: &str,
) -> Result<CombinedContent> {
    get_combined_course_content_with(ctx, credentials, course_url, FetchOptions::default()).await
}

/// Fetch a course's announcement and weekly content as one list.
///
/// The list is `[announcement?, placeholder, weeks...]`. Only results with
/// more than the placeholder are cached.
pub async fn get_combined_course_content_with(
    ctx: &PortalContext,
    credentials: &Credentials,
    course_url: &str,
    options: FetchOptions,
) -> Result<CombinedContent> {
    let course_url = normalize_course_url(course_url)?;
    let key = cache_key(CONTENT_PREFIX, &credentials.username, Some(&course_url));

    if !options.force_refresh {
        match ctx.cache.get_json::<CombinedContent>(&key).await {
            Some(items) if !items.is_empty() => {
                log::info!("Serving course content for {} from cache", credentials.username);
                return Ok(items);
            }
            Some(_) => log::warn!("Cached course content under '{key}' is empty; refetching"),
            None => {}
        }
    }

    log::info!(
        "Fetching course content for {} from {}",
        credentials.username,
        course_url
    );
    let session = ctx.sessions.create_session(credentials)?;
    let cms_base = ctx.cms_base()?;
    let content_timeout = Duration::from_secs(ctx.config.http.content_timeout_secs);
    let announcement_timeout = Duration::from_secs(ctx.config.http.announcement_timeout_secs);

    let (content, announcement) = futures::join!(
        within(
            content_timeout,
            "course content",
            fetch_course_content(session.as_ref(), &course_url, &cms_base, content_timeout),
        ),
        within(
            announcement_timeout,
            "course announcement",
            fetch_course_announcement(session.as_ref(), &course_url, announcement_timeout),
        ),
    );

    let combined = merge(content, announcement)?;
    if combined.len() > 1 {
        ctx.cache
            .set_json(&key, &combined, ctx.config.cache.default_ttl())
            .await;
    } else {
        log::warn!("Course content for {course_url} has nothing beyond the placeholder; not caching");
    }
    Ok(combined)
}

async fn within<T>(
    limit: Duration,
    context: &str,
    branch: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, branch)
        .await
        .map_err(|_| AppError::timeout(context, limit.as_secs()))?
}

fn merge(content: Result<Vec<WeekItem>>, announcement: Result<String>) -> Result<CombinedContent> {
    let (weeks, announcement) = match (content, announcement) {
        (Err(content_err), Err(announcement_err)) => {
            log::error!("Course announcement failed: {announcement_err}");
            log::error!("Course content failed: {content_err}");
            let err = if announcement_err.is_auth_failure() && !content_err.is_auth_failure() {
                announcement_err
            } else {
                content_err
            };
            return Err(err);
        }
        (Ok(weeks), Ok(announcement)) => (weeks, Some(announcement)),
        (Ok(weeks), Err(e)) => {
            log::warn!("Course announcement failed, continuing without it: {e}");
            (weeks, None)
        }
        (Err(e), Ok(announcement)) => {
            log::warn!("Course content failed, returning announcement only: {e}");
            (Vec::new(), Some(announcement))
        }
    };

    let mut items = CombinedContent::with_capacity(weeks.len() + 2);
    if let Some(html) = announcement.filter(|html| !html.trim().is_empty()) {
        items.push(ContentItem::Announcement(AnnouncementItem {
            course_announcement: html,
        }));
    }
    items.push(ContentItem::Week(WeekItem::placeholder()));
    items.extend(weeks.into_iter().map(ContentItem::Week));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::testing::{ScriptedProvider, ScriptedSession, test_config};

    const COURSE_URL: &str = "cms.guc.edu.eg/apps/student/CourseViewStn?id=12&sid=65";
    const WEEKS: &str = r#"<div class="weeksdata"><h2 class="text-big">Week: 2025-03-01</h2>
        <div class="p-3"><div class="card mb-4"><div id="content1">Lecture 1</div>
        <a id="download" href="/file.pdf">Download</a></div></div></div>"#;
    const ANNOUNCEMENT: &str =
        r#"<div id="ContentPlaceHolderright_ContentPlaceHoldercontent_desc"><p>Quiz next week</p></div>"#;

    struct Fixture {
        ctx: PortalContext,
        session: Arc<ScriptedSession>,
        provider: Arc<ScriptedProvider>,
        cache: Cache,
    }

    fn fixture() -> Fixture {
        let session = Arc::new(ScriptedSession::new());
        let provider = Arc::new(ScriptedProvider::new(session.clone()));
        let cache = Cache::new(Arc::new(MemoryCache::new(8)));
        let ctx = PortalContext::new(Arc::new(test_config()), provider.clone(), cache.clone());
        Fixture {
            ctx,
            session,
            provider,
            cache,
        }
    }

    fn key() -> String {
        let url = normalize_course_url(COURSE_URL).unwrap();
        cache_key(CONTENT_PREFIX, "student", Some(&url))
    }

    fn creds() -> Credentials {
        Credentials::new("student", "pw")
    }

    fn is_placeholder(item: &ContentItem) -> bool {
        matches!(item, ContentItem::Week(week) if week.is_placeholder())
    }

    #[tokio::test]
    async fn test_announcement_timeout_keeps_content() {
        let f = fixture();
        f.session.push_body(WEEKS);
        f.session.push_delayed(Duration::from_secs(3), ANNOUNCEMENT);

        let items = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(is_placeholder(&items[0]));
        assert!(matches!(&items[1], ContentItem::Week(w) if w.week_name == "Week: 2025-03-01"));

        let cached: Option<CombinedContent> = f.cache.get_json(&key()).await;
        assert_eq!(cached, Some(items));
    }

    #[tokio::test]
    async fn test_content_failure_keeps_announcement() {
        let f = fixture();
        f.session.push_failure("content page unreachable");
        f.session.push_body(ANNOUNCEMENT);

        let items = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[0],
            ContentItem::Announcement(a) if a.course_announcement == "<p>Quiz next week</p>"
        ));
        assert!(is_placeholder(&items[1]));
        assert!(f.cache.get_json::<CombinedContent>(&key()).await.is_some());
    }

    #[tokio::test]
    async fn test_both_failures_are_error_and_not_cached() {
        let f = fixture();
        f.session.push_failure("content down");
        f.session.push_failure("announcement down");

        let err = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Fetch { .. }));
        assert_eq!(f.cache.get_json::<CombinedContent>(&key()).await, None);
    }

    #[tokio::test]
    async fn test_both_branches_share_one_session() {
        let f = fixture();
        f.session.push_body(WEEKS);
        f.session.push_body(ANNOUNCEMENT);

        let items = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], ContentItem::Announcement(_)));
        assert!(is_placeholder(&items[1]));
        assert_eq!(f.provider.sessions_created(), 1);

        let normalized = normalize_course_url(COURSE_URL).unwrap();
        assert!(f.session.requests().iter().all(|r| r.url == normalized));
    }

    #[tokio::test]
    async fn test_placeholder_only_not_cached() {
        let f = fixture();
        f.session.push_body("<html><body>no weeks</body></html>");
        f.session.push_failure("announcement down");

        let items = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(f.cache.get_json::<CombinedContent>(&key()).await, None);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let f = fixture();
        let cached = vec![
            ContentItem::Week(WeekItem::placeholder()),
            ContentItem::Week(WeekItem {
                week_name: "Week 9".to_string(),
                announcement: String::new(),
                description: String::new(),
                contents: Vec::new(),
            }),
        ];
        f.cache.set_json(&key(), &cached, Duration::from_secs(60)).await;

        let items = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();

        assert_eq!(items, cached);
        assert_eq!(f.provider.sessions_created(), 0);
    }

    #[tokio::test]
    async fn test_invalid_cached_shape_is_miss() {
        let f = fixture();
        f.cache
            .set_json(&key(), &serde_json::json!({"weeks": 3}), Duration::from_secs(60))
            .await;
        f.session.push_body(WEEKS);
        f.session.push_body(ANNOUNCEMENT);

        let items = get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(f.provider.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_empty_cached_list_is_miss() {
        let f = fixture();
        f.cache
            .set_json(&key(), &Vec::<ContentItem>::new(), Duration::from_secs(60))
            .await;
        f.session.push_body(WEEKS);
        f.session.push_body(ANNOUNCEMENT);

        get_combined_course_content(&f.ctx, &creds(), COURSE_URL)
            .await
            .unwrap();
        assert_eq!(f.provider.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_invalid_course_url() {
        let f = fixture();
        let err = get_combined_course_content(&f.ctx, &creds(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_merge_prefers_auth_error() {
        let err = merge(
            Err(AppError::fetch("course content", "HTTP 500")),
            Err(AppError::auth("login marker")),
        )
        .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_merge_drops_blank_announcement() {
        let items = merge(Ok(Vec::new()), Ok("  \n ".to_string())).unwrap();
        assert_eq!(items.len(), 1);
    }
}
