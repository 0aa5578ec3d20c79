//! # HTTP Data Source Factory
//!
//! The HTTP-backed [`DataSourceFactory`]: one shared `reqwest` client, plus
//! an immutable header/user-agent snapshot that header overrides replace
//! atomically. Sources stamp the snapshot current at creation time, so a
//! concurrent override never produces a partially-updated request.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::{ResolveError, TransportError};
use crate::source::{BoxByteStream, DataSource, DataSourceFactory, DataSpec};

/// Create a `reqwest` client from the resolver configuration. Used when the
/// host does not inject its own client.
pub fn create_client(config: &ResolverConfig) -> Result<Client, ResolveError> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        builder = builder.connect_timeout(config.connect_timeout);
    }

    builder.build().map_err(ResolveError::from)
}

/// Immutable transport configuration snapshot.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// User agent sent with every request.
    pub user_agent: String,
    /// Default request headers, installed wholesale by the last override.
    pub default_headers: HeaderMap,
}

/// HTTP-backed data source factory, memoized per resolver generation.
pub struct HttpDataSourceFactory {
    client: Client,
    snapshot: RwLock<Arc<HttpConfig>>,
}

impl HttpDataSourceFactory {
    /// Create a factory around an existing client with the identifying user
    /// agent and no default headers.
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            snapshot: RwLock::new(Arc::new(HttpConfig {
                user_agent: user_agent.into(),
                default_headers: HeaderMap::new(),
            })),
        }
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<HttpConfig> {
        self.snapshot.read().clone()
    }

    /// Install request header overrides, replacing the previous set.
    ///
    /// A `User-Agent` entry is pulled out of the working set: its trimmed,
    /// non-empty value replaces the factory's user agent. Every other value
    /// is trimmed and installed as the new default-header set; the previous
    /// set is discarded entirely. Unusable names or values are dropped with
    /// a diagnostic and never abort the override.
    pub fn set_headers(&self, headers: &HashMap<String, String>) {
        let current = self.config();
        let mut user_agent = current.user_agent.clone();
        let mut installed = HeaderMap::with_capacity(headers.len());

        for (name, value) in headers {
            let value = value.trim();

            if name.eq_ignore_ascii_case("user-agent") {
                if value.is_empty() {
                    continue;
                }
                if HeaderValue::from_str(value).is_ok() {
                    user_agent = value.to_owned();
                } else {
                    warn!("Unusable User-Agent override, keeping previous value");
                }
                continue;
            }

            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(parsed_name), Ok(parsed_value)) => {
                    installed.insert(parsed_name, parsed_value);
                }
                _ => warn!(header = %name, "Dropping unusable request header override"),
            }
        }

        debug!(count = installed.len(), "Installed request header overrides");
        *self.snapshot.write() = Arc::new(HttpConfig {
            user_agent,
            default_headers: installed,
        });
    }
}

impl DataSourceFactory for HttpDataSourceFactory {
    fn create(&self) -> Box<dyn DataSource> {
        Box::new(HttpDataSource {
            client: self.client.clone(),
            config: self.config(),
        })
    }
}

/// A single-resource HTTP reader carrying the snapshot it was created with.
pub struct HttpDataSource {
    client: Client,
    config: Arc<HttpConfig>,
}

#[async_trait::async_trait]
impl DataSource for HttpDataSource {
    async fn open(&self, spec: &DataSpec) -> Result<BoxByteStream, TransportError> {
        let mut request = self
            .client
            .get(spec.uri.clone())
            .headers(self.config.default_headers.clone())
            .header(header::USER_AGENT, self.config.user_agent.as_str());

        if spec.position > 0 {
            request = request.header(header::RANGE, format!("bytes={}-", spec.position));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status()));
        }

        // A server may ignore the range request and answer 200 with the full
        // body; drop the prefix locally so the caller still reads from the
        // requested position.
        let skip = if spec.position > 0 && response.status() == StatusCode::OK {
            debug!(url = %spec.uri, position = spec.position, "Range ignored by server, skipping prefix");
            spec.position
        } else {
            0
        };

        let stream = response
            .bytes_stream()
            .map(|result| result.map_err(TransportError::from))
            .boxed();

        Ok(if skip > 0 {
            skip_prefix(stream, skip)
        } else {
            stream
        })
    }
}

fn skip_prefix(stream: BoxByteStream, skip: u64) -> BoxByteStream {
    futures::stream::unfold((stream, skip), |(mut stream, mut skip)| async move {
        loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    if skip == 0 {
                        return Some((Ok(chunk), (stream, 0)));
                    }
                    let len = chunk.len() as u64;
                    if len <= skip {
                        skip -= len;
                        continue;
                    }
                    let rest = chunk.slice(skip as usize..);
                    return Some((Ok(rest), (stream, 0)));
                }
                Some(Err(e)) => return Some((Err(e), (stream, skip))),
                None => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;

    fn factory() -> HttpDataSourceFactory {
        HttpDataSourceFactory::new(Client::new(), "resio-engine/0.1")
    }

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_user_agent_is_extracted_and_trimmed() {
        let factory = factory();
        factory.set_headers(&headers(&[
            ("User-Agent", " Foo/1.0 "),
            ("Referer", " https://example.com "),
        ]));

        let config = factory.config();
        assert_eq!(config.user_agent, "Foo/1.0");
        assert!(config.default_headers.get(header::USER_AGENT).is_none());
        assert_eq!(
            config.default_headers.get(header::REFERER).unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn test_override_replaces_previous_set() {
        let factory = factory();
        factory.set_headers(&headers(&[("X-First", "1")]));
        factory.set_headers(&headers(&[("X-Second", "2")]));

        let config = factory.config();
        assert!(config.default_headers.get("x-first").is_none());
        assert_eq!(config.default_headers.get("x-second").unwrap(), "2");
        assert_eq!(config.default_headers.len(), 1);
    }

    #[test]
    fn test_user_agent_survives_later_overrides() {
        let factory = factory();
        factory.set_headers(&headers(&[("User-Agent", "Foo/1.0")]));
        factory.set_headers(&headers(&[("Referer", "https://example.com")]));

        assert_eq!(factory.config().user_agent, "Foo/1.0");
    }

    #[test]
    fn test_empty_user_agent_keeps_previous_value() {
        let factory = factory();
        factory.set_headers(&headers(&[("User-Agent", "   ")]));
        assert_eq!(factory.config().user_agent, "resio-engine/0.1");
    }

    #[test]
    fn test_unusable_header_is_dropped_not_fatal() {
        let factory = factory();
        factory.set_headers(&headers(&[
            ("bad name with spaces", "x"),
            ("X-Good", "ok"),
        ]));

        let config = factory.config();
        assert_eq!(config.default_headers.len(), 1);
        assert_eq!(config.default_headers.get("x-good").unwrap(), "ok");
    }

    #[test]
    fn test_sources_keep_their_snapshot() {
        let factory = factory();
        factory.set_headers(&headers(&[("X-First", "1")]));
        let before = factory.config();
        factory.set_headers(&headers(&[("X-Second", "2")]));

        assert!(before.default_headers.get("x-first").is_some());
        assert!(!Arc::ptr_eq(&before, &factory.config()));
    }

    #[tokio::test]
    async fn test_skip_prefix_drops_leading_bytes() {
        let chunks = vec![
            Ok(Bytes::from_static(b"0123")),
            Ok(Bytes::from_static(b"4567")),
        ];
        let stream = stream::iter(chunks).boxed();

        let mut skipped = skip_prefix(stream, 6);
        let mut out = Vec::new();
        while let Some(item) = skipped.next().await {
            out.extend_from_slice(&item.unwrap());
        }
        assert_eq!(out, b"67");
    }
}
