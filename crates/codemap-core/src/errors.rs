use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;

#[derive(Debug, Error)]
pub enum CodemapError {
    #[error("Failed to resolve project root {path}: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("No language extractors registered")]
    NoExtractors,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Incomplete job results: expected {expected}, got {got}")]
    IncompleteResults { expected: usize, got: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl CodemapError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodemapError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CodemapError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CodemapError>;
