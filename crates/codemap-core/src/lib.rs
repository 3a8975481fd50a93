pub mod cache;
pub mod concerns;
pub mod config;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod language;
pub mod model;
pub mod parallel;
pub mod planner;
pub mod registry;
pub mod render;
pub mod snapshot;

pub use cache::{CacheManager, CacheState, FileCacheStore, Tier};
pub use config::{CliOverrides, Options, CONFIG_FILE_NAME};
pub use engine::{compute_hash, ensure_up_to_date, generate, is_stale};
pub use errors::{CodemapError, Result};
pub use language::{Language, LanguageSet};
pub use model::{Codemap, Concern, FileSummary, Package, TypeInfo};
pub use parallel::{CancellationToken, WorkerPool};
pub use registry::{AnalysisOutcome, AnalysisStats, ExtractorRegistry};
pub use snapshot::Snapshot;
