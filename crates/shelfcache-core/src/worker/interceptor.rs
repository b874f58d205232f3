use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::{ResourceRequest, ResourceResponse};
use crate::network::Network;
use crate::store::{CacheHandle, CacheStore};

/// Cache-first request router for one cache generation.
///
/// 1. Look the request up in the generation. A generation that was never
///    installed, or has since been evicted, is treated as empty.
/// 2. On a hit, return the stored response without touching the network.
/// 3. On a miss, fetch from the network, store a copy and return the other.
///    If the network fails, the (empty) lookup result is returned; there is
///    no offline placeholder.
pub struct FetchInterceptor<S, N> {
    store: Arc<S>,
    network: Arc<N>,
    generation: String,
}

impl<S: CacheStore, N: Network> FetchInterceptor<S, N> {
    pub fn new(store: Arc<S>, network: Arc<N>, generation: impl Into<String>) -> Self {
        Self {
            store,
            network,
            generation: generation.into(),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Serve one intercepted request. `None` means the load failed.
    ///
    /// Must run inside a tokio runtime: the store write on a miss is spawned
    /// so it completes even if the caller drops this future.
    pub async fn handle(&self, request: &ResourceRequest) -> Option<ResourceResponse> {
        let key = request.key();

        // Lookups never create the generation; only install does
        let cache = match self.store.open_existing(&self.generation).await {
            Ok(cache) => cache,
            Err(e) => {
                warn!(generation = %self.generation, request = %key, error = %e, "Cache open failed, fetching uncached");
                return self.fetch_uncached(request).await;
            }
        };

        let cached = match &cache {
            Some(cache) => match cache.match_request(&key).await {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(generation = %self.generation, request = %key, error = %e, "Cache lookup failed, fetching uncached");
                    return self.fetch_uncached(request).await;
                }
            },
            None => None,
        };

        if cached.is_some() {
            debug!(request = %key, "Cache hit");
            return cached;
        }

        debug!(request = %key, "Cache miss");
        let response = match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                // TODO: serve a configurable offline fallback resource instead of no response
                debug!(request = %key, error = %e, "Network failed on cache miss");
                return cached;
            }
        };

        if !key.method.is_cacheable() {
            return Some(response);
        }
        let Some(cache) = cache else {
            debug!(generation = %self.generation, request = %key, "Generation not present, response not stored");
            return Some(response);
        };

        let (for_store, for_caller) = response.duplicate();
        let generation = self.generation.clone();
        let write = tokio::spawn(async move {
            let label = key.to_string();
            if let Err(e) = cache.put(key, for_store).await {
                warn!(generation = %generation, request = %label, error = %e, "Failed to store fetched response");
            }
        });
        if let Err(e) = write.await {
            warn!(error = %e, "Cache write task failed");
        }

        Some(for_caller)
    }

    /// Degraded path when the store itself is failing.
    async fn fetch_uncached(&self, request: &ResourceRequest) -> Option<ResourceResponse> {
        match self.network.fetch(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(request = %request.url, error = %e, "Uncached network fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;
    use crate::store::MemoryCacheStore;
    use crate::testing::{FlakyStore, ScriptedNetwork};

    fn interceptor<S: CacheStore>(
        store: Arc<S>,
        network: Arc<ScriptedNetwork>,
    ) -> FetchInterceptor<S, ScriptedNetwork> {
        FetchInterceptor::new(store, network, "v1")
    }

    /// Memory store with an (empty) installed "v1" generation.
    async fn installed() -> Arc<MemoryCacheStore> {
        let store = Arc::new(MemoryCacheStore::new());
        store.open("v1").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_hit_does_not_touch_network() {
        let store = installed().await;
        store
            .open("v1")
            .await
            .unwrap()
            .put(ResourceRequest::get("/a").key(), ResourceResponse::new("/a", 200, "cached"))
            .await
            .unwrap();
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "fresh"));

        let resp = interceptor(store, network.clone())
            .handle(&ResourceRequest::get("/a"))
            .await
            .unwrap();
        assert_eq!(resp.body, b"cached");
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fills_cache() {
        let store = installed().await;
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "A"));
        let fetcher = interceptor(store.clone(), network.clone());

        let first = fetcher.handle(&ResourceRequest::get("/a")).await.unwrap();
        assert_eq!(first.body, b"A");
        assert_eq!(network.calls(), 1);

        let second = fetcher.handle(&ResourceRequest::get("/a")).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_on_miss_returns_none() {
        let store = installed().await;
        let network = Arc::new(ScriptedNetwork::new().fail("/a"));

        let resp = interceptor(store.clone(), network.clone())
            .handle(&ResourceRequest::get("/a"))
            .await;
        assert!(resp.is_none());
        assert_eq!(network.calls(), 1);

        let cache = store.open("v1").await.unwrap();
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_never_creates_generation() {
        let store = Arc::new(MemoryCacheStore::new());
        let network = Arc::new(ScriptedNetwork::new().fail("/a").serve("/b", 200, "B"));
        let fetcher = interceptor(store.clone(), network.clone());

        assert!(fetcher.handle(&ResourceRequest::get("/a")).await.is_none());
        assert!(store.list_generation_names().await.unwrap().is_empty());

        // Online miss is served but has nowhere to be stored
        let resp = fetcher.handle(&ResourceRequest::get("/b")).await.unwrap();
        assert_eq!(resp.body, b"B");
        assert!(store.list_generation_names().await.unwrap().is_empty());
        fetcher.handle(&ResourceRequest::get("/b")).await.unwrap();
        assert_eq!(network.calls_for("/b"), 2);
    }

    #[tokio::test]
    async fn test_evicted_generation_stays_evicted() {
        let store = installed().await;
        store.open("v2").await.unwrap();
        store.delete_generation("v1").await.unwrap();
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "A"));
        let fetcher = interceptor(store.clone(), network.clone());

        assert_eq!(fetcher.handle(&ResourceRequest::get("/a")).await.unwrap().body, b"A");
        network.fail_all();
        assert!(fetcher.handle(&ResourceRequest::get("/zzz")).await.is_none());

        let names: Vec<_> = store.list_generation_names().await.unwrap().into_iter().collect();
        assert_eq!(names, vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_error_statuses_are_stored_and_returned() {
        let store = installed().await;
        let network = Arc::new(ScriptedNetwork::new().serve("/gone", 404, "not found"));
        let fetcher = interceptor(store, network.clone());

        let resp = fetcher.handle(&ResourceRequest::get("/gone")).await.unwrap();
        assert_eq!(resp.status, 404);
        let again = fetcher.handle(&ResourceRequest::get("/gone")).await.unwrap();
        assert_eq!(again.status, 404);
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_get_passes_through_uncached() {
        let store = installed().await;
        let network = Arc::new(ScriptedNetwork::new().serve("/submit", 201, "ok"));
        let fetcher = interceptor(store.clone(), network.clone());
        let post = ResourceRequest::new(Method::Post, "/submit");

        assert_eq!(fetcher.handle(&post).await.unwrap().status, 201);
        assert_eq!(fetcher.handle(&post).await.unwrap().status, 201);
        assert_eq!(network.calls(), 2);
        assert!(store.open("v1").await.unwrap().keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_falls_through_to_network() {
        let store = Arc::new(FlakyStore::new());
        store.open("v1").await.unwrap();
        store.fail_opens(true);
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "A"));
        let fetcher = interceptor(store.clone(), network.clone());

        let resp = fetcher.handle(&ResourceRequest::get("/a")).await.unwrap();
        assert_eq!(resp.body, b"A");

        store.fail_opens(false);
        let cache = store.open("v1").await.unwrap();
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_still_returns_response() {
        let store = Arc::new(FlakyStore::new());
        store.open("v1").await.unwrap();
        store.fail_puts(true);
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "A"));

        let resp = interceptor(store, network)
            .handle(&ResourceRequest::get("/a"))
            .await
            .unwrap();
        assert_eq!(resp.body, b"A");
    }

    #[tokio::test]
    async fn test_write_completes_after_caller_gives_up() {
        let store = Arc::new(FlakyStore::new());
        let cache = store.open("v1").await.unwrap();
        let gate = store.hold_puts();
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "A"));
        let fetcher = interceptor(store.clone(), network);
        let request = ResourceRequest::get("/a");

        {
            let handling = fetcher.handle(&request);
            tokio::pin!(handling);
            tokio::select! {
                _ = &mut handling => panic!("handle finished while its write was held"),
                _ = gate.started.notified() => {}
            }
            // `handling` is dropped here with the write still in flight
        }
        assert!(cache.keys().await.unwrap().is_empty());

        gate.release.notify_one();
        for _ in 0..100 {
            if !cache.keys().await.unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let stored = cache.match_request(&request.key()).await.unwrap().unwrap();
        assert_eq!(stored.body, b"A");
    }

    #[tokio::test]
    async fn test_concurrent_misses_last_write_wins() {
        let store = installed().await;
        let network = Arc::new(ScriptedNetwork::new().serve("/a", 200, "A"));
        let fetcher = interceptor(store.clone(), network.clone());
        let request = ResourceRequest::get("/a");

        let (a, b) = tokio::join!(fetcher.handle(&request), fetcher.handle(&request));
        assert_eq!(a.unwrap().body, b"A");
        assert_eq!(b.unwrap().body, b"A");
        // No dedup: each miss may reach the network
        assert!((1..=2).contains(&network.calls()));
        assert_eq!(store.open("v1").await.unwrap().keys().await.unwrap().len(), 1);
    }
}
