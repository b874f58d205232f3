//! Cache store capability.
//!
//! The store maps a request identity to a stored response, grouped into named
//! cache generations. The core only talks to it through [`CacheStore`] and
//! [`CacheHandle`]; each operation is atomic per key, so callers never lock.
//!
//! Two implementations ship with the crate:
//! - `MemoryCacheStore`: in-process, for hosts that own persistence themselves
//! - `DiskCacheStore`: one directory per generation, one record per request

pub mod disk;
pub mod memory;
pub mod record;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{RequestKey, ResourceResponse};

pub use disk::DiskCacheStore;
pub use memory::MemoryCacheStore;
pub use record::{CacheRecord, RecordInfo};

/// Named, versioned response store.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    type Handle: CacheHandle + 'static;

    /// Open the generation called `name`, creating it if absent.
    async fn open(&self, name: &str) -> StoreResult<Self::Handle>;

    /// Open the generation called `name` only if it already exists.
    async fn open_existing(&self, name: &str) -> StoreResult<Option<Self::Handle>>;

    async fn list_generation_names(&self) -> StoreResult<BTreeSet<String>>;

    /// Delete a generation and all its records. Returns whether it existed.
    async fn delete_generation(&self, name: &str) -> StoreResult<bool>;
}

/// An open cache generation.
#[async_trait]
pub trait CacheHandle: Send + Sync {
    /// Look up a stored response. Non-GET requests never match.
    async fn match_request(&self, request: &RequestKey) -> StoreResult<Option<ResourceResponse>>;

    /// Store `response` under `request`, replacing any previous record.
    /// Fails with `StoreError::MethodNotCacheable` for non-GET requests.
    async fn put(&self, request: RequestKey, response: ResourceResponse) -> StoreResult<()>;

    /// Summaries of every record in the generation, ordered by request.
    async fn keys(&self) -> StoreResult<Vec<RecordInfo>>;
}
