//! # Cache Module
//!
//! Bounded, time-limited caching for resolved tracks.
//!
//! Resolving a query through yt-dlp costs a process spawn and several network
//! round trips. Popular requests repeat often within a session, so the
//! resolver keeps successful results for a short while.
//!
//! ## Features
//!
//! - **LRU Eviction**: the least recently read entry goes first when full
//! - **TTL Support**: stream URLs expire upstream, so entries do too
//! - **Thread Safety**: concurrent access from every guild's consumer
//!
//! ## Configuration
//!
//! ```env
//! RESOLVER_CACHE_SIZE=100      # Maximum number of cached resolutions
//! RESOLVER_CACHE_TTL_SECS=1800 # Time-to-live in seconds
//! ```

pub mod lru_cache;

pub use lru_cache::{CacheMetrics, LRUCache};

use crate::sources::ResolvedTrack;

/// Cache de resoluciones, indexado por la consulta normalizada
pub type ResolverCache = LRUCache<String, ResolvedTrack>;

/// Normaliza una consulta para usarla como clave
pub fn cache_key(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
