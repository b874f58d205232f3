//! shelfcache core - offline resource cache manager.
//!
//! Intercepts resource requests and serves them from a versioned local cache,
//! falling back to the network and repopulating the cache on a miss.
//!
//! The host environment supplies two capabilities, a [`CacheStore`] and a
//! [`Network`], and drives a [`CacheManager`] through its three lifecycle
//! entry points: install, activate and fetch.

pub mod config;
pub mod error;
pub mod models;
pub mod network;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{InstallError, LifecycleError, NetworkError, StoreError};
pub use models::{Method, RequestKey, ResourceRequest, ResourceResponse};
pub use network::{HttpNetwork, Network};
pub use store::{CacheHandle, CacheRecord, CacheStore, DiskCacheStore, MemoryCacheStore, RecordInfo};
pub use worker::{
    CacheManager, FetchInterceptor, GenerationReaper, LifecycleSnapshot, LifecycleState,
    PrecacheLoader, ReapReport, Ready,
};
