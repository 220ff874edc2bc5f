// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

use crate::error::{AppError, Result};

/// Normalize a course page URL so equal courses produce equal strings.
///
/// Percent-decodes, lowercases, defaults the scheme to `https`, recovers a
/// host written without a scheme, drops a trailing slash and appends `.aspx`
/// to course view paths that lack it.
///
/// # Examples
/// ```
/// use portal_scraper::utils::url::normalize_course_url;
///
/// assert_eq!(
///     normalize_course_url("cms.guc.edu.eg/apps/student/CourseViewStn?id=1&sid=2").unwrap(),
///     "https://cms.guc.edu.eg/apps/student/courseviewstn.aspx?id=1&sid=2"
/// );
/// ```
pub fn normalize_course_url(raw: &str) -> Result<String> {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let decoded = decoded.trim().to_lowercase();

    if decoded.is_empty() {
        return Err(AppError::validation("course URL is empty"));
    }

    let with_scheme = if decoded.contains("://") {
        decoded
    } else {
        let trimmed = decoded.trim_start_matches('/');
        let host = trimmed.split('/').next().unwrap_or_default();
        if !host.contains('.') {
            return Err(AppError::validation(format!(
                "course URL has no host: {raw}"
            )));
        }
        format!("https://{trimmed}")
    };

    let mut parsed = Url::parse(&with_scheme)?;
    if parsed.host_str().is_none() {
        return Err(AppError::validation(format!("course URL has no host: {raw}")));
    }

    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.contains("courseviewstn") && !path.ends_with(".aspx") {
        path.push_str(".aspx");
    }
    parsed.set_path(&path);

    Ok(parsed.to_string())
}

/// Replace the query of `base` with the portal's `v=<token>` indirection.
pub fn with_redirect_token(base: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(base)?;
    url.set_query(Some(&format!("v={token}")));
    Ok(url.to_string())
}

/// Whether a URL points at a login page.
pub fn is_login_url(url: &str) -> bool {
    url.to_lowercase().contains("login")
}
