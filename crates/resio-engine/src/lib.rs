//! # resio-engine
//!
//! Media-source resolution for a playback engine: turns a playback URI plus
//! optional request headers into a ready-to-stream source, with
//! protocol-aware dispatch (RTMP, RTSP, DASH, HLS, progressive) and an
//! optional bounded on-disk LRU cache.
//!
//! ## Features
//!
//! - Content-type classification as a pure function of the URI
//! - One shared HTTP data-source factory with atomically swapped header
//!   overrides
//! - Read-through disk cache with strict LRU eviction that fails open on
//!   every cache error
//! - Registration table for host-supplied native transports
//! - Generational resolver state: explicit construction, explicit `reset()`

pub mod builder;
pub mod cache;
pub mod config;
pub mod content_type;
pub mod error;
pub mod extractor;
pub mod http;
pub mod registry;
pub mod resolver;
pub mod source;

pub use builder::ResolverConfigBuilder;
pub use cache::{CacheReader, CacheStore, CacheWriter, CachingFactory};
pub use config::{DEFAULT_CACHE_CAPACITY, ResolverConfig};
pub use content_type::ContentType;
pub use error::{ResolveError, TransportError};
pub use extractor::ExtractorConfig;
pub use http::{HttpConfig, HttpDataSourceFactory, create_client};
pub use registry::ProtocolRegistry;
pub use resolver::SourceResolver;
pub use source::{
    BoxByteStream, DataSource, DataSourceFactory, DataSpec, PlaybackRequest, ResolvedSource,
};
