//! Lifecycle dispatch for one deployed cache generation.
//!
//! The host wires its install, activate and fetch events to
//! [`CacheManager::on_install`], [`CacheManager::on_activate`] and
//! [`CacheManager::on_fetch`]. State changes are published on a watch channel
//! so the host can observe skip-waiting and client claiming.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::models::{ResourceRequest, ResourceResponse};
use crate::network::Network;
use crate::store::CacheStore;

use super::{FetchInterceptor, GenerationReaper, PrecacheLoader, ReapReport, Ready};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, no install attempted yet.
    Parsed,
    Installing,
    /// Precache succeeded; ready to take over.
    Installed,
    Activating,
    /// Current generation; intercepting fetches.
    Activated,
    /// Install failed. The previous generation stays authoritative.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    /// Set once precache succeeds: activate without waiting for sessions to close.
    pub skip_waiting: bool,
    /// Set once activation has taken control of already-open sessions.
    pub clients_claimed: bool,
}

impl Default for LifecycleSnapshot {
    fn default() -> Self {
        Self {
            state: LifecycleState::Parsed,
            skip_waiting: false,
            clients_claimed: false,
        }
    }
}

pub struct CacheManager<S, N> {
    generation: String,
    manifest: Vec<String>,
    store: Arc<S>,
    network: Arc<N>,
    precache: PrecacheLoader<S, N>,
    reaper: GenerationReaper<S>,
    interceptor: FetchInterceptor<S, N>,
    lifecycle: watch::Sender<LifecycleSnapshot>,
}

impl<S: CacheStore, N: Network> CacheManager<S, N> {
    pub fn new(
        generation: impl Into<String>,
        manifest: Vec<String>,
        store: Arc<S>,
        network: Arc<N>,
    ) -> Self {
        let generation = generation.into();
        let (lifecycle, _) = watch::channel(LifecycleSnapshot::default());
        Self {
            precache: PrecacheLoader::new(store.clone(), network.clone()),
            reaper: GenerationReaper::new(store.clone()),
            interceptor: FetchInterceptor::new(store.clone(), network.clone(), generation.clone()),
            generation,
            manifest,
            store,
            network,
            lifecycle,
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        *self.lifecycle.borrow()
    }

    pub fn state(&self) -> LifecycleState {
        self.snapshot().state
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.lifecycle.subscribe()
    }

    /// Whether fetches are routed through the cache.
    pub fn is_controlling(&self) -> bool {
        self.state() == LifecycleState::Activated
    }

    /// Move to `to` if the current state is in `from`; returns the state
    /// observed before the attempt.
    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<LifecycleState, LifecycleState> {
        let mut outcome = Err(LifecycleState::Parsed);
        self.lifecycle.send_if_modified(|snapshot| {
            if from.contains(&snapshot.state) {
                outcome = Ok(snapshot.state);
                snapshot.state = to;
                true
            } else {
                outcome = Err(snapshot.state);
                false
            }
        });
        outcome
    }

    /// Install event: precache the manifest into this generation.
    ///
    /// On failure the manager becomes `Redundant` and cannot activate; a later
    /// `on_install` may retry.
    pub async fn on_install(&self) -> Result<Ready, LifecycleError> {
        self.transition(
            &[LifecycleState::Parsed, LifecycleState::Redundant],
            LifecycleState::Installing,
        )
        .map_err(|state| LifecycleError::InvalidTransition {
            event: "install",
            state,
        })?;

        match self.precache.install(&self.generation, &self.manifest).await {
            Ok(ready) => {
                self.lifecycle.send_modify(|snapshot| {
                    snapshot.state = LifecycleState::Installed;
                    snapshot.skip_waiting = true;
                });
                info!(generation = %self.generation, cached = ready.cached, "Installed, skipping wait");
                Ok(ready)
            }
            Err(e) => {
                self.lifecycle.send_modify(|snapshot| {
                    snapshot.state = LifecycleState::Redundant;
                    snapshot.skip_waiting = false;
                });
                warn!(generation = %self.generation, error = %e, "Install failed");
                Err(e.into())
            }
        }
    }

    /// Activate event: evict every other generation and claim open sessions.
    /// Re-running on an active generation repeats the cleanup.
    pub async fn on_activate(&self) -> Result<ReapReport, LifecycleError> {
        self.transition(
            &[LifecycleState::Installed, LifecycleState::Activated],
            LifecycleState::Activating,
        )
        .map_err(LifecycleError::NotInstalled)?;

        let report = self.reaper.activate(&self.generation).await;

        self.lifecycle.send_modify(|snapshot| {
            snapshot.state = LifecycleState::Activated;
            snapshot.clients_claimed = true;
        });
        info!(
            generation = %self.generation,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Activated and claimed clients"
        );
        Ok(report)
    }

    /// Fetch event. Uncontrolled requests (before activation) go straight to
    /// the network and never touch the cache.
    pub async fn on_fetch(&self, request: &ResourceRequest) -> Option<ResourceResponse> {
        if self.is_controlling() {
            return self.interceptor.handle(request).await;
        }

        debug!(request = %request.url, state = %self.state(), "Not controlling, passing through");
        match self.network.fetch(request).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!(request = %request.url, error = %e, "Pass-through fetch failed");
                None
            }
        }
    }

    /// Resume a generation that was installed by an earlier run. Eviction is
    /// repeated first, so at most this generation remains once the manager
    /// is controlling. Returns whether the manager is now controlling.
    pub async fn resume(&self) -> bool {
        if self.state() != LifecycleState::Parsed {
            return self.is_controlling();
        }

        let present = match self.store.list_generation_names().await {
            Ok(names) => names.contains(&self.generation),
            Err(e) => {
                warn!(generation = %self.generation, error = %e, "Failed to check for existing generation");
                false
            }
        };
        if !present {
            return false;
        }

        if self
            .transition(&[LifecycleState::Parsed], LifecycleState::Activating)
            .is_err()
        {
            return self.is_controlling();
        }

        let report = self.reaper.activate(&self.generation).await;
        self.lifecycle.send_modify(|snapshot| snapshot.state = LifecycleState::Activated);
        info!(
            generation = %self.generation,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Resumed existing generation"
        );
        true
    }
}
