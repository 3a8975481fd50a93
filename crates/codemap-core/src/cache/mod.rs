//! Incremental staleness cache
//!
//! Persists per-file sizes, mtimes and content hashes so that "is the index
//! out of date?" can usually be answered from metadata alone, plus a colder
//! per-unit analysis cache keyed by content fingerprints.

mod error;
mod hash;
mod invalidation;
mod manager;
mod manifest;
mod module;
mod store;

pub use error::{CacheError, Result};
pub use hash::{aggregate_hash, hash_bytes, hash_file, package_fingerprint};
pub use invalidation::{directories_match, sniffed_match, stat_entries, InvalidationEngine, Probe};
pub use manager::{CacheManager, CurrentHash, Tier};
pub use manifest::{CacheState, DirStateEntry, StateEntry};
pub use module::{AnalysisCache, AnalysisScope, AnalysisSection, CachedPackage};
pub use store::{write_atomic, FileCacheStore, DEFAULT_FLUSH_INTERVAL};

/// State format version - increment when the state layout changes
pub const STATE_VERSION: u32 = 5;

/// Analysis cache format version
pub const ANALYSIS_CACHE_VERSION: u32 = 2;
