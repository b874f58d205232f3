use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::CacheStore;

/// Outcome of an activation cleanup.
#[derive(Debug, Default)]
pub struct ReapReport {
    /// Whether the current generation was present in the store.
    pub kept: bool,
    pub deleted: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}

/// Deletes every cache generation except the current one.
pub struct GenerationReaper<S> {
    store: Arc<S>,
}

impl<S: CacheStore> GenerationReaper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Best-effort and idempotent: a failed listing or deletion is logged and
    /// reported, never returned as an error, and one failed deletion does not
    /// stop the others.
    pub async fn activate(&self, current: &str) -> ReapReport {
        let names = match self.store.list_generation_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(current, error = %e, "Failed to list cache generations, skipping cleanup");
                return ReapReport::default();
            }
        };

        let kept = names.contains(current);
        let stale: Vec<String> = names.into_iter().filter(|name| name != current).collect();

        let results = join_all(stale.into_iter().map(|name| async move {
            let result = self.store.delete_generation(&name).await;
            (name, result)
        }))
        .await;

        let mut report = ReapReport {
            kept,
            ..ReapReport::default()
        };
        for (name, result) in results {
            match result {
                Ok(_) => {
                    info!(generation = %name, "Deleted stale cache generation");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(generation = %name, error = %e, "Failed to delete stale cache generation");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }
}
