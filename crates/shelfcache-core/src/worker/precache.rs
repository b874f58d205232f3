use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::error::InstallError;
use crate::models::{RequestKey, ResourceRequest, ResourceResponse};
use crate::network::Network;
use crate::store::{CacheHandle, CacheStore};

/// Maximum concurrent manifest fetches during install.
/// Manifests are small; 6 matches a browser's per-host connection limit.
const MAX_CONCURRENT_PRECACHE: usize = 6;

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    pub generation: String,
    pub cached: usize,
}

/// Populates a new cache generation with the manifest, all or nothing.
pub struct PrecacheLoader<S, N> {
    store: Arc<S>,
    network: Arc<N>,
}

impl<S: CacheStore, N: Network> PrecacheLoader<S, N> {
    pub fn new(store: Arc<S>, network: Arc<N>) -> Self {
        Self { store, network }
    }

    /// Fetch every manifest entry and store them in `generation`.
    ///
    /// Nothing is written until every fetch has succeeded with a 2xx status.
    /// If storing fails part way and the generation did not exist before, the
    /// generation is removed again so the visible set of generations is the
    /// same as before the call.
    pub async fn install(&self, generation: &str, manifest: &[String]) -> Result<Ready, InstallError> {
        let requests: Vec<ResourceRequest> = manifest
            .iter()
            .map(|entry| ResourceRequest::get(entry.as_str()))
            .collect();

        let mut seen = HashSet::new();
        for request in &requests {
            if !seen.insert(request.key()) {
                return Err(InstallError::DuplicateEntry(request.url.clone()));
            }
        }

        info!(generation, entries = requests.len(), "Precaching manifest");

        let responses: Vec<(RequestKey, ResourceResponse)> = stream::iter(requests.iter())
            .map(|request| self.fetch_entry(request))
            .buffered(MAX_CONCURRENT_PRECACHE)
            .try_collect()
            .await?;

        let store_err = |source| InstallError::Store {
            generation: generation.to_string(),
            source,
        };

        let existed = self
            .store
            .list_generation_names()
            .await
            .map_err(store_err)?
            .contains(generation);
        let cache = self.store.open(generation).await.map_err(store_err)?;

        let cached = responses.len();
        for (key, response) in responses {
            if let Err(source) = cache.put(key, response).await {
                if !existed {
                    self.discard(generation).await;
                }
                return Err(store_err(source));
            }
        }

        info!(generation, cached, "Precache complete");
        Ok(Ready {
            generation: generation.to_string(),
            cached,
        })
    }

    async fn fetch_entry(
        &self,
        request: &ResourceRequest,
    ) -> Result<(RequestKey, ResourceResponse), InstallError> {
        let response = self
            .network
            .fetch(request)
            .await
            .map_err(|source| InstallError::Fetch {
                resource: request.url.clone(),
                source,
            })?;

        if !response.is_ok() {
            return Err(InstallError::BadStatus {
                resource: request.url.clone(),
                status: response.status,
            });
        }

        debug!(resource = %request.url, bytes = response.body.len(), "Fetched manifest entry");
        Ok((request.key(), response))
    }

    async fn discard(&self, generation: &str) {
        if let Err(e) = self.store.delete_generation(generation).await {
            warn!(generation, error = %e, "Failed to discard partially installed generation");
        }
    }
}
