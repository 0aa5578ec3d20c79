//! # Read-Through Cache Factory
//!
//! Wraps an upstream [`DataSourceFactory`] with the cache store: hits stream
//! from disk, misses stream from upstream while being written back. The
//! wrapper fails open on every cache error — a broken lookup bypasses the
//! store, a mid-read failure transparently reopens upstream at the
//! already-delivered offset, and a failed write-back abandons the entry but
//! keeps serving.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::cache::store::{CacheStore, CacheWriter};
use crate::source::{BoxByteStream, DataSource, DataSourceFactory, DataSpec};

/// Caching wrapper over an upstream transport factory.
pub struct CachingFactory {
    upstream: Arc<dyn DataSourceFactory>,
    store: Arc<CacheStore>,
    write_back: bool,
}

impl CachingFactory {
    /// Wrap `upstream` with read-through caching against `store`.
    pub fn new(upstream: Arc<dyn DataSourceFactory>, store: Arc<CacheStore>) -> Self {
        Self {
            upstream,
            store,
            write_back: true,
        }
    }

    /// Read-only variant: serve hits but never populate the store. Used
    /// when another owner is filling it.
    pub fn read_only(mut self) -> Self {
        self.write_back = false;
        self
    }
}

impl DataSourceFactory for CachingFactory {
    fn create(&self) -> Box<dyn DataSource> {
        Box::new(CacheDataSource {
            upstream: Arc::clone(&self.upstream),
            store: Arc::clone(&self.store),
            write_back: self.write_back,
        })
    }
}

struct CacheDataSource {
    upstream: Arc<dyn DataSourceFactory>,
    store: Arc<CacheStore>,
    write_back: bool,
}

#[async_trait::async_trait]
impl DataSource for CacheDataSource {
    async fn open(&self, spec: &DataSpec) -> Result<BoxByteStream, crate::error::TransportError> {
        // The store is keyed by whole resource; ranged reads go straight
        // upstream.
        if spec.position != 0 {
            return self.upstream.create().open(spec).await;
        }

        let key = CacheStore::key_for(spec.uri.as_str());
        match self.store.reader(&key).await {
            Ok(Some(reader)) => {
                debug!(url = %spec.uri, "Serving playback bytes from cache");
                return Ok(fail_open(reader, Arc::clone(&self.upstream), spec.clone()));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %spec.uri, error = %e, "Cache lookup failed, bypassing cache")
            }
        }

        let upstream = self.upstream.create().open(spec).await?;
        if !self.write_back {
            return Ok(upstream);
        }

        match self.store.writer(&key).await {
            Ok(writer) => Ok(write_through(upstream, writer)),
            Err(e) => {
                warn!(url = %spec.uri, error = %e, "Cache writer unavailable, serving uncached");
                Ok(upstream)
            }
        }
    }
}

/// Serve a cache hit, but on any mid-read I/O error reopen upstream at the
/// offset already delivered and continue from there.
fn fail_open<S>(reader: S, upstream: Arc<dyn DataSourceFactory>, spec: DataSpec) -> BoxByteStream
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    struct State<S> {
        reader: Option<S>,
        fallback: Option<BoxByteStream>,
        upstream: Arc<dyn DataSourceFactory>,
        spec: DataSpec,
        delivered: u64,
    }

    let state = State {
        reader: Some(reader),
        fallback: None,
        upstream,
        spec,
        delivered: 0,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(fallback) = st.fallback.as_mut() {
                return fallback.next().await.map(|item| (item, st));
            }

            let Some(reader) = st.reader.as_mut() else {
                return None;
            };
            match reader.next().await {
                Some(Ok(chunk)) => {
                    st.delivered += chunk.len() as u64;
                    return Some((Ok(chunk), st));
                }
                Some(Err(e)) => {
                    warn!(
                        url = %st.spec.uri,
                        error = %e,
                        delivered = st.delivered,
                        "Cache read failed mid-stream, falling back to upstream"
                    );
                    // Release the pin before going to the network.
                    st.reader = None;
                    let resume = DataSpec::at(st.spec.uri.clone(), st.spec.position + st.delivered);
                    match st.upstream.create().open(&resume).await {
                        Ok(stream) => st.fallback = Some(stream),
                        Err(e) => return Some((Err(e), st)),
                    }
                }
                None => return None,
            }
        }
    })
    .boxed()
}

/// Pass upstream bytes through to the caller while appending them to a
/// pending cache entry, committing on clean end-of-stream. Cache write
/// failures abandon the entry and keep serving.
fn write_through(upstream: BoxByteStream, writer: CacheWriter) -> BoxByteStream {
    struct State {
        upstream: BoxByteStream,
        writer: Option<CacheWriter>,
        done: bool,
    }

    let state = State {
        upstream,
        writer: Some(writer),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        match st.upstream.next().await {
            Some(Ok(chunk)) => {
                if let Some(writer) = st.writer.take() {
                    match writer.append(&chunk).await {
                        Ok(writer) => st.writer = Some(writer),
                        Err(e) => warn!(error = %e, "Cache write failed, continuing uncached"),
                    }
                }
                Some((Ok(chunk), st))
            }
            Some(Err(e)) => {
                // Never cache a truncated resource.
                st.writer = None;
                st.done = true;
                Some((Err(e), st))
            }
            None => {
                if let Some(writer) = st.writer.take() {
                    let bytes = writer.written();
                    if let Err(e) = writer.commit().await {
                        warn!(error = %e, "Failed to commit cache entry");
                    } else {
                        debug!(bytes, "Cache entry populated");
                    }
                }
                None
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Upstream stand-in serving a fixed payload in two chunks and counting
    /// how many times it is opened.
    struct MockUpstream {
        payload: Bytes,
        fetches: Arc<AtomicUsize>,
    }

    impl MockUpstream {
        fn new(payload: &'static [u8]) -> (Arc<Self>, Arc<AtomicUsize>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            let upstream = Arc::new(Self {
                payload: Bytes::from_static(payload),
                fetches: Arc::clone(&fetches),
            });
            (upstream, fetches)
        }
    }

    impl DataSourceFactory for MockUpstream {
        fn create(&self) -> Box<dyn DataSource> {
            Box::new(MockSource {
                payload: self.payload.clone(),
                fetches: Arc::clone(&self.fetches),
            })
        }
    }

    struct MockSource {
        payload: Bytes,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl DataSource for MockSource {
        async fn open(&self, spec: &DataSpec) -> Result<BoxByteStream, TransportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let body = self.payload.slice(spec.position as usize..);
            let mid = body.len() / 2;
            let chunks = vec![Ok(body.slice(..mid)), Ok(body.slice(mid..))];
            Ok(futures::stream::iter(chunks).boxed())
        }
    }

    fn spec(uri: &str) -> DataSpec {
        DataSpec::new(Url::parse(uri).unwrap())
    }

    async fn read_all(mut stream: BoxByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.extend_from_slice(&item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_miss_fetches_upstream_and_populates() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), 1024).await.unwrap();
        let (upstream, fetches) = MockUpstream::new(b"full media payload");
        let factory = CachingFactory::new(upstream, Arc::clone(&store));

        let spec = spec("https://example.com/clip.mp4");
        let stream = factory.create().open(&spec).await.unwrap();
        assert_eq!(read_all(stream).await, b"full media payload");

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(store.contains(&CacheStore::key_for(spec.uri.as_str())));
    }

    #[tokio::test]
    async fn test_hit_serves_from_disk_without_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), 1024).await.unwrap();
        let (upstream, fetches) = MockUpstream::new(b"full media payload");
        let factory = CachingFactory::new(upstream, Arc::clone(&store));

        let spec = spec("https://example.com/clip.mp4");
        read_all(factory.create().open(&spec).await.unwrap()).await;
        let second = read_all(factory.create().open(&spec).await.unwrap()).await;

        assert_eq!(second, b"full media payload");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_only_variant_never_populates() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), 1024).await.unwrap();
        let (upstream, fetches) = MockUpstream::new(b"bytes");
        let factory = CachingFactory::new(upstream, Arc::clone(&store)).read_only();

        let spec = spec("https://example.com/clip.mp4");
        read_all(factory.create().open(&spec).await.unwrap()).await;
        read_all(factory.create().open(&spec).await.unwrap()).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_ranged_request_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), 1024).await.unwrap();
        let (upstream, fetches) = MockUpstream::new(b"0123456789");
        let factory = CachingFactory::new(upstream, Arc::clone(&store));

        let spec = DataSpec::at(Url::parse("https://example.com/clip.mp4").unwrap(), 4);
        let body = read_all(factory.create().open(&spec).await.unwrap()).await;

        assert_eq!(body, b"456789");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_broken_lookup_falls_back_to_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), 1024).await.unwrap();
        let (upstream, fetches) = MockUpstream::new(b"full media payload");
        let factory = CachingFactory::new(upstream, Arc::clone(&store));

        let spec = spec("https://example.com/clip.mp4");
        read_all(factory.create().open(&spec).await.unwrap()).await;

        // Pull the blob out from under the index; the next open hits a
        // lookup error and must still produce the payload.
        let key = CacheStore::key_for(spec.uri.as_str());
        std::fs::remove_file(dir.path().join(format!("{key}.blob"))).unwrap();

        let body = read_all(factory.create().open(&spec).await.unwrap()).await;
        assert_eq!(body, b"full media payload");
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mid_read_failure_resumes_upstream_at_offset() {
        let (upstream, fetches) = MockUpstream::new(b"full media payload");
        let broken = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"full ")),
            Err(std::io::Error::other("disk gone")),
        ]);

        let spec = spec("https://example.com/clip.mp4");
        let upstream: Arc<dyn DataSourceFactory> = upstream;
        let stream = fail_open(broken, upstream, spec);
        let body = read_all(stream).await;

        assert_eq!(body, b"full media payload");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
