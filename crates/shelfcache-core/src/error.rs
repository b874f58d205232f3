//! Error types for the cache manager.
//!
//! Each capability has its own error enum. Network errors never escape the
//! fetch path; install errors abort an install; store errors are fatal to
//! the single operation that hit them.

use std::path::PathBuf;

use thiserror::Error;

use crate::worker::LifecycleState;

pub type StoreResult<T> = Result<T, StoreError>;
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Failures of the cache store capability.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize cache record {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid cache generation name: {0:?}")]
    InvalidGenerationName(String),

    #[error("Cache generation no longer exists: {0}")]
    GenerationMissing(String),

    #[error("Requests with method {0} cannot be cached")]
    MethodNotCacheable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the network capability. Any HTTP status counts as a
/// successful fetch, so these are transport level only.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid resource URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid request method: {0}")]
    InvalidMethod(String),

    #[error("Resource unreachable: {0}")]
    Unreachable(String),
}

/// Install (precache) failures. Any of these leaves the new generation
/// unready and the previous one authoritative.
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Manifest lists {0} more than once")]
    DuplicateEntry(String),

    #[error("Failed to fetch manifest entry {resource}: {source}")]
    Fetch {
        resource: String,
        #[source]
        source: NetworkError,
    },

    #[error("Manifest entry {resource} returned status {status}")]
    BadStatus { resource: String, status: u16 },

    #[error("Failed to store precached resources in {generation}: {source}")]
    Store {
        generation: String,
        #[source]
        source: StoreError,
    },
}

/// Lifecycle dispatch failures on [`crate::CacheManager`].
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Cannot {event} while {state}")]
    InvalidTransition {
        event: &'static str,
        state: LifecycleState,
    },

    #[error("Cannot activate: generation is not installed (state: {0})")]
    NotInstalled(LifecycleState),

    #[error(transparent)]
    Install(#[from] InstallError),
}
