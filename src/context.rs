//! Per-process dependencies passed into every operation.

use std::sync::Arc;

use url::Url;

use crate::cache::Cache;
use crate::error::Result;
use crate::http::{HttpSessionProvider, SessionProvider};
use crate::models::Config;

/// Configuration, session provider and cache shared by all operations.
#[derive(Clone)]
pub struct PortalContext {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionProvider>,
    pub cache: Cache,
}

impl PortalContext {
    pub fn new(config: Arc<Config>, sessions: Arc<dyn SessionProvider>, cache: Cache) -> Self {
        Self {
            config,
            sessions,
            cache,
        }
    }

    /// Validate `config` and build the HTTP provider and configured cache.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let sessions: Arc<dyn SessionProvider> = Arc::new(HttpSessionProvider::new(
            config.http.clone(),
            config.portal.auth_domain.clone(),
        ));
        let cache = Cache::from_config(&config.cache).await;
        Ok(Self::new(Arc::new(config), sessions, cache))
    }

    /// Base URL that relative course download links resolve against.
    pub fn cms_base(&self) -> Result<Url> {
        Ok(Url::parse(&self.config.portal.cms_base_url)?)
    }
}
