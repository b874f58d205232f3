use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::{RequestKey, ResourceResponse};

use super::{CacheHandle, CacheRecord, CacheStore, RecordInfo};

type Entries = Arc<RwLock<BTreeMap<RequestKey, CacheRecord>>>;

/// In-process cache store.
///
/// Handles keep their generation's entries alive, so a handle opened before
/// its generation was deleted keeps working against the detached entries
/// without bringing the generation back.
#[derive(Default)]
pub struct MemoryCacheStore {
    generations: RwLock<BTreeMap<String, Entries>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    type Handle = MemoryCache;

    async fn open(&self, name: &str) -> StoreResult<MemoryCache> {
        if let Some(entries) = self.generations.read().await.get(name) {
            return Ok(MemoryCache {
                entries: entries.clone(),
            });
        }

        let mut generations = self.generations.write().await;
        let entries = generations
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(generation = name, "Created cache generation");
                Entries::default()
            })
            .clone();
        Ok(MemoryCache { entries })
    }

    async fn open_existing(&self, name: &str) -> StoreResult<Option<MemoryCache>> {
        Ok(self
            .generations
            .read()
            .await
            .get(name)
            .map(|entries| MemoryCache {
                entries: entries.clone(),
            }))
    }

    async fn list_generation_names(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.generations.read().await.keys().cloned().collect())
    }

    async fn delete_generation(&self, name: &str) -> StoreResult<bool> {
        Ok(self.generations.write().await.remove(name).is_some())
    }
}

/// Handle to one generation of a [`MemoryCacheStore`].
#[derive(Clone)]
pub struct MemoryCache {
    entries: Entries,
}

#[async_trait]
impl CacheHandle for MemoryCache {
    async fn match_request(&self, request: &RequestKey) -> StoreResult<Option<ResourceResponse>> {
        if !request.method.is_cacheable() {
            return Ok(None);
        }
        Ok(self
            .entries
            .read()
            .await
            .get(request)
            .map(|record| record.response.clone()))
    }

    async fn put(&self, request: RequestKey, response: ResourceResponse) -> StoreResult<()> {
        if !request.method.is_cacheable() {
            return Err(StoreError::MethodNotCacheable(request.method.to_string()));
        }
        let record = CacheRecord::new(request.clone(), response);
        self.entries.write().await.insert(request, record);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<RecordInfo>> {
        Ok(self.entries.read().await.values().map(CacheRecord::info).collect())
    }
}
