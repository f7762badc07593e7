//! Time-boxed cache of the metric names the backend knows.
//!
//! Reads are served from an in-memory snapshot while it is fresh. An expired
//! snapshot is refreshed by exactly one caller at a time; concurrent callers
//! wait for that refresh and then read its result. A failed refresh yields an
//! empty catalog (fail-open) and leaves the old timestamp alone so the next
//! call tries again.

use crate::MetricsBackend;
use chrono::Utc;
use sextant_core::MetricCatalog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(60);

/// Result of one refresh, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Success,
    Failure,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Success => "success",
            RefreshStatus::Failure => "failure",
        }
    }
}

/// Hook called after every refresh attempt.
pub type RefreshHook = fn(RefreshStatus);

pub struct MetricCatalogCache {
    backend: Arc<dyn MetricsBackend>,
    ttl: Duration,
    snapshot: RwLock<MetricCatalog>,
    refresh_lock: Mutex<()>,
    on_refresh: Option<RefreshHook>,
}

impl MetricCatalogCache {
    pub fn new(backend: Arc<dyn MetricsBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            snapshot: RwLock::new(MetricCatalog::empty(ttl)),
            refresh_lock: Mutex::new(()),
            on_refresh: None,
        }
    }

    pub fn with_refresh_hook(mut self, hook: RefreshHook) -> Self {
        self.on_refresh = Some(hook);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The catalog to validate against right now.
    pub async fn current(&self) -> MetricCatalog {
        if let Some(catalog) = self.fresh_snapshot().await {
            return catalog;
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(catalog) = self.fresh_snapshot().await {
            return catalog;
        }

        self.refresh().await
    }

    /// Last stored snapshot, fresh or not.
    pub async fn snapshot(&self) -> MetricCatalog {
        self.snapshot.read().await.clone()
    }

    async fn fresh_snapshot(&self) -> Option<MetricCatalog> {
        let snapshot = self.snapshot.read().await;
        snapshot.is_fresh(Utc::now()).then(|| snapshot.clone())
    }

    async fn refresh(&self) -> MetricCatalog {
        let result = self.backend.list_metric_names().await;
        let status = if result.is_ok() {
            RefreshStatus::Success
        } else {
            RefreshStatus::Failure
        };
        if let Some(hook) = self.on_refresh {
            hook(status);
        }

        match result {
            Ok(names) => {
                let catalog = MetricCatalog::new(names, Utc::now(), self.ttl);
                info!(metrics = catalog.len(), "Refreshed metric catalog");
                *self.snapshot.write().await = catalog.clone();
                catalog
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch metric names, validating fail-open");
                debug!(backend = self.backend.backend_id(), "Catalog left unrefreshed");
                MetricCatalog::empty(self.ttl)
            }
        }
    }
}

impl std::fmt::Debug for MetricCatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricCatalogCache")
            .field("backend", &self.backend.backend_id())
            .field("ttl", &self.ttl)
            .finish()
    }
}
