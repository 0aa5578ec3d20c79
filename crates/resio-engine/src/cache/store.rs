//! # Cache Store
//!
//! A byte-capacity-bounded on-disk store with strict LRU eviction, rooted at
//! a host-supplied directory. One blob file per entry, named by the sha256 of
//! the resource URI; an `index.json` persists access order across restarts
//! and is reconciled against the blobs actually on disk at open, so an
//! unclean process exit never fails the reopen.
//!
//! Readers pin the entry they stream from. Evicting a pinned entry removes
//! it from the index immediately but defers the unlink until the last reader
//! drops, so an in-flight read is never truncated.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{self, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const INDEX_FILE: &str = "index.json";
const DATA_SUFFIX: &str = "blob";
const TMP_SUFFIX: &str = "tmp";

static WRITER_NONCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct Entry {
    size: u64,
    last_access: u64,
    pins: u32,
    doomed: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, Entry>,
    total_bytes: u64,
    access_seq: u64,
}

#[derive(Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    size: u64,
    last_access: u64,
}

#[derive(Serialize, Deserialize)]
struct Index {
    version: u32,
    entries: Vec<IndexEntry>,
}

/// Bounded on-disk LRU store. At most one instance exists per resolver
/// generation; all handles share it through an `Arc`.
pub struct CacheStore {
    root: PathBuf,
    capacity: u64,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// Open (or create) a store rooted at `root` with the given byte
    /// capacity. Capacity is fixed for the lifetime of the store.
    pub async fn open(root: impl Into<PathBuf>, capacity: u64) -> io::Result<Arc<CacheStore>> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        // Access order survives restarts through the index; sizes always
        // come from the files themselves.
        let mut persisted: HashMap<String, u64> = HashMap::new();
        let index_path = root.join(INDEX_FILE);
        if let Ok(bytes) = fs::read(&index_path).await {
            match serde_json::from_slice::<Index>(&bytes) {
                Ok(index) => {
                    for entry in index.entries {
                        persisted.insert(entry.key, entry.last_access);
                    }
                }
                Err(e) => {
                    warn!(path = ?index_path, error = %e, "Discarding unreadable cache index")
                }
            }
        }

        let mut state = StoreState::default();
        let mut read_dir = fs::read_dir(&root).await?;
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(DATA_SUFFIX) => {}
                Some(TMP_SUFFIX) => {
                    // Leftover from an interrupted write.
                    let _ = fs::remove_file(&path).await;
                    continue;
                }
                _ => continue,
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                continue;
            };
            let size = dir_entry.metadata().await?.len();
            let last_access = persisted.get(&key).copied().unwrap_or(0);
            state.total_bytes += size;
            state.entries.insert(
                key,
                Entry {
                    size,
                    last_access,
                    pins: 0,
                    doomed: false,
                },
            );
        }
        state.access_seq = state.entries.values().map(|e| e.last_access).max().unwrap_or(0);

        debug!(
            root = ?root,
            entries = state.entries.len(),
            total_bytes = state.total_bytes,
            "Opened cache store"
        );

        let store = Arc::new(CacheStore {
            root,
            capacity,
            state: Mutex::new(state),
        });

        // The bound may have shrunk since the last run.
        store.evict_over_capacity().await;

        Ok(store)
    }

    /// Canonical cache key for a resource URI.
    pub fn key_for(uri: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(uri.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Byte capacity this store was opened with.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Total bytes currently accounted to live entries.
    pub fn total_bytes(&self) -> u64 {
        self.state.lock().total_bytes
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.values().filter(|e| !e.doomed).count()
    }

    /// Whether a live entry exists for the key.
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.doomed)
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{DATA_SUFFIX}"))
    }

    /// Open a streaming reader for the entry, touching its LRU position and
    /// pinning it against physical removal. `Ok(None)` is a miss.
    pub async fn reader(self: &Arc<Self>, key: &str) -> io::Result<Option<CacheReader>> {
        {
            let mut state = self.state.lock();
            state.access_seq += 1;
            let seq = state.access_seq;
            match state.entries.get_mut(key) {
                Some(entry) if !entry.doomed => {
                    entry.last_access = seq;
                    entry.pins += 1;
                }
                _ => return Ok(None),
            }
        }

        // The pin is held from here on; an open failure releases it on drop.
        let pin = PinGuard {
            store: Arc::clone(self),
            key: key.to_owned(),
        };
        let file = File::open(self.blob_path(key)).await?;
        Ok(Some(CacheReader {
            inner: ReaderStream::new(file),
            _pin: pin,
        }))
    }

    /// Start writing an entry. Bytes land in a temp file; nothing becomes
    /// visible until [`CacheWriter::commit`]. Dropping the writer abandons
    /// the temp file.
    pub async fn writer(self: &Arc<Self>, key: &str) -> io::Result<CacheWriter> {
        let nonce = WRITER_NONCE.fetch_add(1, Ordering::Relaxed);
        let tmp = self.root.join(format!("{key}.{nonce}.{TMP_SUFFIX}"));
        let file = File::create(&tmp).await?;
        Ok(CacheWriter {
            store: Arc::clone(self),
            key: key.to_owned(),
            tmp,
            file: Some(file),
            written: 0,
        })
    }

    /// Evict least-recently-used entries until the live total fits the
    /// capacity. Pinned victims are doomed instead: invisible immediately,
    /// unlinked when their last reader drops.
    async fn evict_over_capacity(&self) {
        let victims: Vec<String> = {
            let mut state = self.state.lock();
            let mut victims = Vec::new();
            while state.total_bytes > self.capacity {
                let lru = state
                    .entries
                    .iter()
                    .filter(|(_, e)| !e.doomed)
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, e)| (k.clone(), e.size, e.pins == 0));
                let Some((key, size, unpinned)) = lru else {
                    break;
                };
                state.total_bytes -= size;
                if unpinned {
                    state.entries.remove(&key);
                    victims.push(key);
                } else {
                    if let Some(entry) = state.entries.get_mut(&key) {
                        entry.doomed = true;
                    }
                    debug!(key = %key, "Deferring eviction of pinned cache entry");
                }
            }
            victims
        };

        for key in victims {
            debug!(key = %key, "Evicted cache entry");
            let _ = fs::remove_file(self.blob_path(&key)).await;
        }
    }

    /// Persist the index. Called on teardown; safe to call repeatedly.
    pub async fn flush_index(&self) -> io::Result<()> {
        let index = {
            let state = self.state.lock();
            Index {
                version: 1,
                entries: state
                    .entries
                    .iter()
                    .filter(|(_, e)| !e.doomed)
                    .map(|(key, e)| IndexEntry {
                        key: key.clone(),
                        size: e.size,
                        last_access: e.last_access,
                    })
                    .collect(),
            }
        };
        let json = serde_json::to_vec(&index)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = self.root.join(format!("{INDEX_FILE}.{TMP_SUFFIX}"));
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, self.root.join(INDEX_FILE)).await?;
        Ok(())
    }

    /// Flush the index and release the store. Pending pinned removals still
    /// complete as their readers drop.
    pub async fn close(&self) {
        if let Err(e) = self.flush_index().await {
            warn!(root = ?self.root, error = %e, "Failed to flush cache index");
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("root", &self.root)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Keeps an entry's blob on disk while a reader streams from it.
struct PinGuard {
    store: Arc<CacheStore>,
    key: String,
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let unlink = {
            let mut state = self.store.state.lock();
            match state.entries.get_mut(&self.key) {
                Some(entry) => {
                    entry.pins = entry.pins.saturating_sub(1);
                    if entry.doomed && entry.pins == 0 {
                        state.entries.remove(&self.key);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if unlink {
            debug!(key = %self.key, "Removing cache entry after last reader closed");
            let _ = std::fs::remove_file(self.store.blob_path(&self.key));
        }
    }
}

/// Streaming reader over a cached blob. Holds a pin for its whole lifetime.
pub struct CacheReader {
    inner: ReaderStream<File>,
    _pin: PinGuard,
}

impl Stream for CacheReader {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// In-progress cache entry write. Ownership-passing API so appends can run
/// inside `'static` stream adapters.
pub struct CacheWriter {
    store: Arc<CacheStore>,
    key: String,
    tmp: PathBuf,
    file: Option<File>,
    written: u64,
}

impl CacheWriter {
    /// Append a chunk to the pending entry.
    pub async fn append(mut self, chunk: &Bytes) -> io::Result<CacheWriter> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.written += chunk.len() as u64;
        }
        Ok(self)
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Publish the entry: rename the temp file into place, account it in
    /// the index, and evict whatever no longer fits.
    pub async fn commit(mut self) -> io::Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush().await?;
        drop(file);

        fs::rename(&self.tmp, self.store.blob_path(&self.key)).await?;

        {
            let mut state = self.store.state.lock();
            state.access_seq += 1;
            let seq = state.access_seq;
            let prior = state.entries.remove(&self.key);
            let (pins, prior_size, was_doomed) = prior
                .map(|e| (e.pins, e.size, e.doomed))
                .unwrap_or((0, 0, false));
            // A doomed entry's size already left the total when it was
            // evicted; its blob was just replaced, so it is live again.
            if !was_doomed {
                state.total_bytes -= prior_size;
            }
            state.total_bytes += self.written;
            state.entries.insert(
                self.key.clone(),
                Entry {
                    size: self.written,
                    last_access: seq,
                    pins,
                    doomed: false,
                },
            );
        }

        debug!(key = %self.key, bytes = self.written, "Committed cache entry");
        self.store.evict_over_capacity().await;
        Ok(())
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        // Uncommitted writes leave nothing behind.
        if let Some(file) = self.file.take() {
            drop(file);
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}
