//! Request driver configuration

use stampede_config::{HttpConfig, StampedeConfig};
use std::time::Duration;

/// Settings the driver's HTTP client is built from
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base relative request URLs are joined onto
    pub base_url: Option<String>,

    /// Timeout for requests that do not set their own
    pub default_timeout: Duration,

    /// Maximum number of redirects to follow
    pub max_redirects: u32,

    /// User agent string
    pub user_agent: String,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,

    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
}

impl DriverConfig {
    /// Driver settings for a loaded run configuration
    pub fn from_run(config: &StampedeConfig) -> Self {
        Self::from(config.http.clone())
            .with_base_url(config.base_url.clone())
            .with_default_timeout(config.default_timeout)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from(HttpConfig::default())
    }
}

impl From<HttpConfig> for DriverConfig {
    fn from(config: HttpConfig) -> Self {
        Self {
            base_url: None,
            default_timeout: Duration::from_secs(30),
            max_redirects: config.max_redirects,
            user_agent: config.user_agent,
            verify_ssl: config.verify_ssl,
            max_idle_per_host: config.connection_pool.max_idle_per_host,
            idle_timeout: config.connection_pool.idle_timeout,
            connect_timeout: config.connection_pool.connection_timeout,
        }
    }
}
