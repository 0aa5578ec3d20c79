use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;

use crate::extractor::ExtractorConfig;

/// Default byte capacity of the on-disk playback cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 512 * 1024 * 1024; // 512 MiB

const DEFAULT_USER_AGENT: &str = "resio-engine/0.1";

/// Configurable options for the source resolver. Fixed once the resolver is
/// constructed; a new configuration means a new resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Directory the on-disk cache lives in, supplied by the host
    /// environment. Persists across process restarts.
    pub cache_dir: PathBuf,

    /// Cache capacity in bytes. Entries beyond this are evicted least
    /// recently used first. No live resize.
    pub cache_capacity: u64,

    /// When false, cached resolutions read the store but never populate it
    /// (another owner is filling it).
    pub cache_write_back: bool,

    /// Identifying user agent, until a resolution overrides it.
    pub user_agent: String,

    /// Overall request timeout. Zero disables the limit, which is the
    /// default: a playing stream has no natural overall deadline.
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Whether to follow redirects.
    pub follow_redirects: bool,

    /// Host-supplied HTTP client. When `None` the resolver builds its own
    /// from the fields above.
    pub client: Option<Client>,

    /// Demuxer flags stamped onto every resolved source.
    pub extractor: ExtractorConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("resio-cache"),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_write_back: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            client: None,
            extractor: ExtractorConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn builder() -> crate::builder::ResolverConfigBuilder {
        crate::builder::ResolverConfigBuilder::new()
    }
}
