//! # Builder for ResolverConfig
//!
//! Fluent construction of [`ResolverConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use resio_engine::ResolverConfig;
//!
//! let config = ResolverConfig::builder()
//!     .with_cache_dir("/var/cache/player")
//!     .with_cache_capacity(256 * 1024 * 1024)
//!     .with_user_agent("MyPlayer/2.0")
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .build();
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;

use crate::config::ResolverConfig;
use crate::extractor::ExtractorConfig;

/// Builder for creating [`ResolverConfig`] instances with a fluent API.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
        }
    }

    /// Set the host-provided cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Set the cache capacity in bytes.
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Select the read-only cache variant: serve hits but never populate.
    pub fn with_cache_write_back(mut self, write_back: bool) -> Self {
        self.config.cache_write_back = write_back;
        self
    }

    /// Set the identifying user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the overall request timeout. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects.
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Inject the host's HTTP client instead of building one.
    pub fn with_client(mut self, client: Client) -> Self {
        self.config.client = Some(client);
        self
    }

    /// Set the demuxer flags stamped onto resolved sources.
    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.config.extractor = extractor;
        self
    }

    /// Build the [`ResolverConfig`] instance.
    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CACHE_CAPACITY;

    #[test]
    fn test_builder_defaults() {
        let config = ResolverConfigBuilder::new().build();
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.cache_write_back);
        assert!(config.follow_redirects);
        assert!(config.timeout.is_zero());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.client.is_none());
    }

    #[test]
    fn test_builder_customization() {
        let config = ResolverConfigBuilder::new()
            .with_cache_dir("/tmp/player-cache")
            .with_cache_capacity(1024)
            .with_cache_write_back(false)
            .with_user_agent("CustomAgent/1.0")
            .with_timeout(Duration::from_secs(60))
            .with_follow_redirects(false)
            .build();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/player-cache"));
        assert_eq!(config.cache_capacity, 1024);
        assert!(!config.cache_write_back);
        assert_eq!(config.user_agent, "CustomAgent/1.0");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(!config.follow_redirects);
    }
}
