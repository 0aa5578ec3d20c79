//! # Source Resolver
//!
//! The public entry point: turns a [`PlaybackRequest`] into a
//! [`ResolvedSource`] the playback engine can open. An explicitly
//! constructed service object — build one at startup, share it by
//! reference; there is no process-global instance.
//!
//! Internal state is generational. Each generation owns one HTTP factory
//! and at most one lazily-opened cache store; [`SourceResolver::reset`]
//! swaps in a fresh generation and tears the old one down. Callers must
//! drain in-flight resolutions and drop prior [`ResolvedSource`]s before
//! resetting — the old generation's cache storage is reclaimed without
//! further checks.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::read_through::CachingFactory;
use crate::cache::store::CacheStore;
use crate::config::ResolverConfig;
use crate::content_type::ContentType;
use crate::error::ResolveError;
use crate::http::{HttpDataSourceFactory, create_client};
use crate::registry::ProtocolRegistry;
use crate::source::{DataSourceFactory, PlaybackRequest, ResolvedSource};

struct Generation {
    http: Arc<HttpDataSourceFactory>,
    // Guarded lazy init: concurrent first cached resolutions construct
    // exactly one store. `Some(None)` records an unusable cache directory,
    // which disables caching for this generation.
    cache: OnceCell<Option<Arc<CacheStore>>>,
}

impl Generation {
    fn new(client: &Client, config: &ResolverConfig) -> Self {
        Self {
            http: Arc::new(HttpDataSourceFactory::new(
                client.clone(),
                config.user_agent.clone(),
            )),
            cache: OnceCell::new(),
        }
    }
}

/// Resolves playback URIs into ready-to-stream sources.
pub struct SourceResolver {
    config: ResolverConfig,
    registry: ProtocolRegistry,
    client: Client,
    generation: RwLock<Arc<Generation>>,
}

impl SourceResolver {
    /// Construct a resolver with no native transports registered.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        Self::with_registry(config, ProtocolRegistry::new())
    }

    /// Construct a resolver with host-registered native transports
    /// (RTMP, RTSP, ...).
    pub fn with_registry(
        config: ResolverConfig,
        registry: ProtocolRegistry,
    ) -> Result<Self, ResolveError> {
        let client = match &config.client {
            Some(client) => client.clone(),
            None => create_client(&config)?,
        };
        let generation = RwLock::new(Arc::new(Generation::new(&client, &config)));
        Ok(Self {
            config,
            registry,
            client,
            generation,
        })
    }

    /// The configuration this resolver was built with.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a playback request into a source.
    ///
    /// RTMP and RTSP dispatch to their registered native transports; header
    /// overrides and caching are not supported on those paths and are
    /// ignored with a diagnostic. Everything else is served through the
    /// HTTP factory, optionally wrapped by the read-through cache.
    pub async fn resolve(&self, request: &PlaybackRequest) -> Result<ResolvedSource, ResolveError> {
        let uri = Url::parse(&request.uri)
            .map_err(|e| ResolveError::UriParse(format!("{}: {e}", request.uri)))?;

        if matches!(uri.scheme(), "rtmp" | "rtsp") {
            return self.resolve_native(uri, request);
        }

        let content_type = ContentType::classify(&uri);
        let generation = { self.generation.read().clone() };

        if !request.headers.is_empty() {
            generation.http.set_headers(&request.headers);
        }

        let http: Arc<dyn DataSourceFactory> = generation.http.clone();
        let factory: Arc<dyn DataSourceFactory> = if request.use_cache {
            match self.cache_store(&generation).await {
                Some(store) => {
                    let mut caching = CachingFactory::new(http, store);
                    if !self.config.cache_write_back {
                        caching = caching.read_only();
                    }
                    Arc::new(caching)
                }
                None => http,
            }
        } else {
            http
        };

        debug!(url = %uri, content_type = ?content_type, cached = request.use_cache, "Resolved playback source");
        Ok(ResolvedSource::new(
            uri,
            content_type,
            factory,
            self.config.extractor.clone(),
        ))
    }

    fn resolve_native(
        &self,
        uri: Url,
        request: &PlaybackRequest,
    ) -> Result<ResolvedSource, ResolveError> {
        // Known protocol limitation, not an error: these transports carry
        // neither header overrides nor the cache.
        if !request.headers.is_empty() || request.use_cache {
            debug!(
                url = %uri,
                scheme = uri.scheme(),
                "Headers and caching are unsupported for this protocol, ignoring"
            );
        }

        let factory = self
            .registry
            .lookup(uri.scheme())
            .cloned()
            .ok_or_else(|| ResolveError::UnsupportedProtocol(uri.scheme().to_owned()))?;

        let content_type = ContentType::classify(&uri);
        Ok(ResolvedSource::new(
            uri,
            content_type,
            factory,
            self.config.extractor.clone(),
        ))
    }

    async fn cache_store(&self, generation: &Arc<Generation>) -> Option<Arc<CacheStore>> {
        generation
            .cache
            .get_or_init(|| async {
                match CacheStore::open(self.config.cache_dir.clone(), self.config.cache_capacity)
                    .await
                {
                    Ok(store) => {
                        info!(
                            dir = ?self.config.cache_dir,
                            capacity = self.config.cache_capacity,
                            "Opened playback cache"
                        );
                        Some(store)
                    }
                    Err(e) => {
                        warn!(
                            dir = ?self.config.cache_dir,
                            error = %e,
                            "Cache directory unavailable, caching disabled"
                        );
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Discard the memoized HTTP factory, header overrides, and cache
    /// store, and start a fresh generation.
    ///
    /// Precondition: no [`ResolvedSource`] from the previous generation is
    /// still active. This is a caller obligation and is not guarded here.
    pub async fn reset(&self) {
        let old = {
            let mut generation = self.generation.write();
            std::mem::replace(
                &mut *generation,
                Arc::new(Generation::new(&self.client, &self.config)),
            )
        };
        if let Some(Some(store)) = old.cache.get() {
            store.close().await;
        }
        info!("Resolver state reset");
    }
}

impl std::fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResolver")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
