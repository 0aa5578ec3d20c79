//! # Playback Cache
//!
//! A bounded on-disk LRU store for playback bytes, plus the read-through
//! factory wrapper that serves hits from disk and populates misses from an
//! upstream transport. Every cache failure degrades to an upstream fetch;
//! a cache error is never a resolution or playback error.

pub mod read_through;
pub mod store;

pub use read_through::CachingFactory;
pub use store::{CacheReader, CacheStore, CacheWriter};
