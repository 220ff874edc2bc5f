//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Portal page locations
    #[serde(default)]
    pub portal: PortalConfig,

    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Cache backend and lifetimes
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("portal.schedule_url", &self.portal.schedule_url),
            ("portal.attendance_url", &self.portal.attendance_url),
            ("portal.cms_base_url", &self.portal.cms_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::validation(format!("{name} is not a valid URL: {e}")))?;
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0
            || self.http.content_timeout_secs == 0
            || self.http.announcement_timeout_secs == 0
        {
            return Err(AppError::validation("http timeouts must be > 0"));
        }
        if self.cache.max_entries == 0 {
            return Err(AppError::validation("cache.max_entries must be > 0"));
        }
        if self.cache.default_ttl_secs == 0 || self.cache.long_ttl_secs == 0 {
            return Err(AppError::validation("cache TTLs must be > 0"));
        }
        Ok(())
    }
}

/// Portal page locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Group schedule page
    #[serde(default = "defaults::schedule_url")]
    pub schedule_url: String,

    /// Student attendance page
    #[serde(default = "defaults::attendance_url")]
    pub attendance_url: String,

    /// Course management system root, used to resolve download links
    #[serde(default = "defaults::cms_base_url")]
    pub cms_base_url: String,

    /// Domain prefixed to the username when authenticating
    #[serde(default = "defaults::auth_domain")]
    pub auth_domain: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            schedule_url: defaults::schedule_url(),
            attendance_url: defaults::attendance_url(),
            cms_base_url: defaults::cms_base_url(),
            auth_domain: defaults::auth_domain(),
        }
    }
}

/// HTTP client and request behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Default per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Timeout for the course content branch
    #[serde(default = "defaults::content_timeout")]
    pub content_timeout_secs: u64,

    /// Timeout for the course announcement branch
    #[serde(default = "defaults::announcement_timeout")]
    pub announcement_timeout_secs: u64,

    /// Pause after each attendance postback in milliseconds
    #[serde(default = "defaults::postback_delay")]
    pub postback_delay_ms: u64,

    /// Redirect hops followed before giving up
    #[serde(default = "defaults::max_redirects")]
    pub max_redirects: usize,

    /// How credentials are presented to the portal
    #[serde(default)]
    pub auth_scheme: AuthScheme,
}

/// HTTP authentication the portal expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Integrated Windows authentication, answered on a 401 challenge
    #[default]
    Ntlm,
    /// `Authorization: Basic` on every same-origin request
    Basic,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn postback_delay(&self) -> Duration {
        Duration::from_millis(self.postback_delay_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            content_timeout_secs: defaults::content_timeout(),
            announcement_timeout_secs: defaults::announcement_timeout(),
            postback_delay_ms: defaults::postback_delay(),
            max_redirects: defaults::max_redirects(),
            auth_scheme: AuthScheme::default(),
        }
    }
}

/// Which cache store to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
    Redis,
    Disabled,
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Entry limit for the memory backend
    #[serde(default = "defaults::max_entries")]
    pub max_entries: usize,

    /// Root directory for the file backend
    #[serde(default = "defaults::cache_dir")]
    pub dir: PathBuf,

    /// Connection URL for the redis backend
    #[serde(default = "defaults::redis_url")]
    pub redis_url: String,

    /// Lifetime of attendance and course content entries
    #[serde(default = "defaults::default_ttl")]
    pub default_ttl_secs: u64,

    /// Lifetime of schedule entries
    #[serde(default = "defaults::long_ttl")]
    pub long_ttl_secs: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn long_ttl(&self) -> Duration {
        Duration::from_secs(self.long_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            max_entries: defaults::max_entries(),
            dir: defaults::cache_dir(),
            redis_url: defaults::redis_url(),
            default_ttl_secs: defaults::default_ttl(),
            long_ttl_secs: defaults::long_ttl(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Portal defaults
    pub fn schedule_url() -> String {
        "https://apps.guc.edu.eg/student_ext/Scheduling/GroupSchedule.aspx".into()
    }
    pub fn attendance_url() -> String {
        "https://apps.guc.edu.eg/student_ext/Attendance/ClassAttendance_ViewStudentAttendance_001.aspx"
            .into()
    }
    pub fn cms_base_url() -> String {
        "https://cms.guc.edu.eg".into()
    }
    pub fn auth_domain() -> String {
        "GUC".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        15
    }
    pub fn content_timeout() -> u64 {
        30
    }
    pub fn announcement_timeout() -> u64 {
        30
    }
    pub fn postback_delay() -> u64 {
        100
    }
    pub fn max_redirects() -> usize {
        10
    }

    // Cache defaults
    pub fn max_entries() -> usize {
        10_000
    }
    pub fn cache_dir() -> PathBuf {
        PathBuf::from("cache")
    }
    pub fn redis_url() -> String {
        "redis://localhost:6379/0".into()
    }
    pub fn default_ttl() -> u64 {
        18_000
    }
    pub fn long_ttl() -> u64 {
        5_184_000
    }
}
