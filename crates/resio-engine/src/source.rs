//! # Data Source Seam
//!
//! The transport-level abstraction the resolver assembles sources from: a
//! [`DataSource`] opens a URI (optionally at a byte offset) and yields a
//! stream of byte chunks, and a [`DataSourceFactory`] builds fresh sources
//! that share the factory's configuration.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::content_type::ContentType;
use crate::error::TransportError;
use crate::extractor::ExtractorConfig;

/// A type alias for a boxed stream of byte chunks.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// A single playback resolution request. Immutable once handed to
/// [`SourceResolver::resolve`](crate::resolver::SourceResolver::resolve).
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    /// The playback URI supplied by the content-resolution layer.
    pub uri: String,
    /// Request header overrides, keyed as supplied.
    pub headers: HashMap<String, String>,
    /// Whether to serve this resource through the on-disk cache.
    pub use_cache: bool,
}

impl PlaybackRequest {
    /// Create a request with no header overrides and caching disabled.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: HashMap::new(),
            use_cache: false,
        }
    }

    /// Set the request header overrides.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Enable or disable the read-through cache for this request.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// Identifies the resource a data source should open.
#[derive(Debug, Clone)]
pub struct DataSpec {
    /// Resource URL.
    pub uri: Url,
    /// Byte offset to start reading from.
    pub position: u64,
}

impl DataSpec {
    /// A spec for the whole resource.
    pub fn new(uri: Url) -> Self {
        Self::at(uri, 0)
    }

    /// A spec starting at the given byte offset.
    pub fn at(uri: Url, position: u64) -> Self {
        Self { uri, position }
    }
}

/// A transport-level byte reader for a single resource.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Open the resource and return its byte stream.
    async fn open(&self, spec: &DataSpec) -> Result<BoxByteStream, TransportError>;
}

/// A reusable builder of [`DataSource`]s carrying shared transport
/// configuration (client, default headers, user agent).
pub trait DataSourceFactory: Send + Sync {
    /// Create a new data source stamped with the factory's current
    /// configuration.
    fn create(&self) -> Box<dyn DataSource>;
}

/// A playback-ready source handle.
///
/// Opaque to the playback engine beyond its accessors; the caller owns its
/// lifetime and must drop it before a
/// [`reset`](crate::resolver::SourceResolver::reset) that would reclaim the
/// cache storage it references.
pub struct ResolvedSource {
    uri: Url,
    content_type: ContentType,
    factory: Arc<dyn DataSourceFactory>,
    extractor: ExtractorConfig,
}

impl ResolvedSource {
    pub(crate) fn new(
        uri: Url,
        content_type: ContentType,
        factory: Arc<dyn DataSourceFactory>,
        extractor: ExtractorConfig,
    ) -> Self {
        Self {
            uri,
            content_type,
            factory,
            extractor,
        }
    }

    /// The resolved playback URL.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// The content type inferred during resolution.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Demuxer flags for this source.
    pub fn extractor(&self) -> &ExtractorConfig {
        &self.extractor
    }

    /// The factory the playback engine draws transport readers from.
    pub fn factory(&self) -> &Arc<dyn DataSourceFactory> {
        &self.factory
    }

    /// Open the source from the beginning.
    pub async fn open(&self) -> Result<BoxByteStream, TransportError> {
        self.open_at(0).await
    }

    /// Open the source at a byte offset.
    pub async fn open_at(&self, position: u64) -> Result<BoxByteStream, TransportError> {
        let spec = DataSpec::at(self.uri.clone(), position);
        self.factory.create().open(&spec).await
    }
}

impl std::fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("uri", &self.uri.as_str())
            .field("content_type", &self.content_type)
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}
