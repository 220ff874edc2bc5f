// src/http/mod.rs

//! Portal session seam.
//!
//! Every page is fetched through a [`PortalSession`] created by a
//! [`SessionProvider`]. The reqwest-backed implementation lives in
//! [`client`]; tests substitute scripted sessions.
//!
//! [`send`] wraps a session call with the per-call deadline and the
//! authentication checks that apply regardless of HTTP status.

pub mod client;
pub mod ntlm;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::Credentials;
use crate::utils::url::{is_login_url, with_redirect_token};

pub use client::{HttpSession, HttpSessionProvider};

/// Body fragments the portal renders instead of the requested page when
/// authentication did not go through.
const LOGIN_FAILURE_MARKERS: [&str; 2] = ["Login Failed!", "Object moved"];

static REDIRECT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sTo\s*\(\s*'([a-zA-Z0-9-]+)'\s*\)").expect("redirect token regex")
});

static LOGIN_FORM_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<form[^>]*action\s*=\s*["'][^"']*login"#).expect("login form regex")
});

/// HTTP method of a portal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request against the portal.
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub url: String,
    /// Form fields for POST, in submission order
    pub form: Vec<(String, String)>,
    pub timeout: Duration,
}

impl PortalRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            form,
            timeout,
        }
    }
}

/// What came back from the portal after redirects were followed.
#[derive(Debug, Clone)]
pub struct PortalResponse {
    pub status: u16,
    pub body: String,
    pub final_url: String,
    /// URLs visited before `final_url`, oldest first
    pub history: Vec<String>,
}

/// An authenticated conversation with the portal.
#[async_trait]
pub trait PortalSession: Send + Sync {
    async fn perform(&self, request: PortalRequest) -> Result<PortalResponse>;
}

/// Creates one session per set of credentials.
pub trait SessionProvider: Send + Sync {
    fn create_session(&self, credentials: &Credentials) -> Result<Arc<dyn PortalSession>>;
}

/// Perform a request with its deadline and authentication checks applied.
///
/// Login markers and login redirects are reported as [`AppError::Auth`];
/// any other non-2xx status is a fetch failure for `context`.
pub async fn send(
    session: &dyn PortalSession,
    request: PortalRequest,
    context: &str,
) -> Result<PortalResponse> {
    let timeout = request.timeout;
    let response = tokio::time::timeout(timeout, session.perform(request))
        .await
        .map_err(|_| AppError::timeout(context, timeout.as_secs()))??;

    ensure_authenticated(&response)?;

    if !(200..300).contains(&response.status) {
        return Err(AppError::fetch(context, format!("HTTP {}", response.status)));
    }

    log::debug!(
        "{} fetched {} (status {})",
        context,
        response.final_url,
        response.status
    );
    Ok(response)
}

/// Reject responses that show the portal did not accept the credentials.
pub fn ensure_authenticated(response: &PortalResponse) -> Result<()> {
    if response.status == 401 {
        return Err(AppError::auth("401 Unauthorized"));
    }

    if let Some(marker) = LOGIN_FAILURE_MARKERS
        .iter()
        .find(|marker| response.body.contains(*marker))
    {
        return Err(AppError::auth(format!("login marker '{marker}' in response")));
    }

    if let Some(hop) = response.history.iter().find(|url| is_login_url(url)) {
        return Err(AppError::auth(format!("redirected through login page {hop}")));
    }

    if is_login_url(&response.final_url)
        && (!response.history.is_empty() || LOGIN_FORM_ACTION.is_match(&response.body))
    {
        return Err(AppError::auth(format!(
            "landed on login page {}",
            response.final_url
        )));
    }

    Ok(())
}

/// Extract the indirection token some pages emit instead of their content.
pub fn extract_redirect_token(html: &str) -> Option<String> {
    let token = REDIRECT_TOKEN
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    if token.is_none() && html.contains("sTo(") {
        log::warn!("Found 'sTo(' call but could not read its token");
    }
    token
}

/// Fetch `base_url`, following the token indirection when the page asks for it.
///
/// Returns the URL of the page that holds the content together with its response.
pub async fn fetch_target_page(
    session: &dyn PortalSession,
    base_url: &str,
    timeout: Duration,
    context: &str,
) -> Result<(String, PortalResponse)> {
    let base = send(session, PortalRequest::get(base_url, timeout), context).await?;

    let Some(token) = extract_redirect_token(&base.body) else {
        log::debug!("{context}: no redirect token, base page is the target");
        return Ok((base_url.to_string(), base));
    };

    let target_url = with_redirect_token(base_url, &token)?;
    log::info!("{context}: following redirect token to {target_url}");
    let target = send(session, PortalRequest::get(&target_url, timeout), context).await?;
    Ok((target_url, target))
}
