//! Test doubles for the store and network capabilities.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{NetworkError, NetworkResult, StoreError, StoreResult};
use crate::models::{RequestKey, ResourceRequest, ResourceResponse};
use crate::network::Network;
use crate::store::memory::MemoryCache;
use crate::store::{CacheHandle, CacheStore, MemoryCacheStore, RecordInfo};

/// Network fake with per-URL scripted responses. Unscripted URLs fail.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Option<(u16, Vec<u8>)>>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.set(url, status, body);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), None);
        self
    }

    pub fn set(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Some((status, body.into())));
    }

    pub fn fail_all(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &ResourceRequest) -> NetworkResult<ResourceResponse> {
        self.calls.lock().unwrap().push(request.url.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable(request.url.clone()));
        }
        match self.routes.lock().unwrap().get(&request.url) {
            Some(Some((status, body))) => Ok(ResourceResponse::new(&request.url, *status, body.clone())),
            _ => Err(NetworkError::Unreachable(request.url.clone())),
        }
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::io(
        "flaky-store",
        std::io::Error::new(std::io::ErrorKind::Other, format!("injected {} failure", what)),
    )
}

/// Holds every put until released, once armed with [`FlakyStore::hold_puts`].
#[derive(Default)]
pub struct PutGate {
    armed: AtomicBool,
    /// Signalled when a held put begins.
    pub started: Notify,
    pub release: Notify,
}

/// Memory store with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryCacheStore,
    fail_opens: AtomicBool,
    fail_puts: Arc<AtomicBool>,
    put_gate: Arc<PutGate>,
    fail_listing: AtomicBool,
    fail_deletes: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn hold_puts(&self) -> Arc<PutGate> {
        self.put_gate.armed.store(true, Ordering::SeqCst);
        self.put_gate.clone()
    }

    fn handle(&self, inner: MemoryCache) -> FlakyCache {
        FlakyCache {
            inner,
            fail_puts: self.fail_puts.clone(),
            put_gate: self.put_gate.clone(),
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.fail_deletes.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    type Handle = FlakyCache;

    async fn open(&self, name: &str) -> StoreResult<FlakyCache> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(injected("open"));
        }
        Ok(self.handle(self.inner.open(name).await?))
    }

    async fn open_existing(&self, name: &str) -> StoreResult<Option<FlakyCache>> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(injected("open"));
        }
        Ok(self.inner.open_existing(name).await?.map(|inner| self.handle(inner)))
    }

    async fn list_generation_names(&self) -> StoreResult<BTreeSet<String>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        self.inner.list_generation_names().await
    }

    async fn delete_generation(&self, name: &str) -> StoreResult<bool> {
        if self.fail_deletes.lock().unwrap().contains(name) {
            return Err(injected("delete"));
        }
        self.inner.delete_generation(name).await
    }
}

pub struct FlakyCache {
    inner: MemoryCache,
    fail_puts: Arc<AtomicBool>,
    put_gate: Arc<PutGate>,
}

#[async_trait]
impl CacheHandle for FlakyCache {
    async fn match_request(&self, request: &RequestKey) -> StoreResult<Option<ResourceResponse>> {
        self.inner.match_request(request).await
    }

    async fn put(&self, request: RequestKey, response: ResourceResponse) -> StoreResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(injected("put"));
        }
        if self.put_gate.armed.load(Ordering::SeqCst) {
            self.put_gate.started.notify_one();
            self.put_gate.release.notified().await;
        }
        self.inner.put(request, response).await
    }

    async fn keys(&self) -> StoreResult<Vec<RecordInfo>> {
        self.inner.keys().await
    }
}
