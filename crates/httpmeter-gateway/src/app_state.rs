//! Shared application state for the httpmeter gateway.
//!
//! Holds the validated config, the metric registry handle and the draining
//! flag. Cheap to clone; every clone points at the same registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use httpmeter_core::MetricRegistry;

use crate::config::GatewayConfig;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    metrics: Arc<MetricRegistry>,
    draining: AtomicBool,
}

impl AppState {
    /// Build state with a fresh registry sized from `cfg.metrics`.
    pub fn new(cfg: GatewayConfig) -> Self {
        let metrics = Arc::new(MetricRegistry::with_buckets(
            cfg.metrics.duration_buckets.clone(),
        ));
        Self::with_registry(cfg, metrics)
    }

    /// Build state around an existing registry (tests, embedding).
    pub fn with_registry(cfg: GatewayConfig, metrics: Arc<MetricRegistry>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                draining: AtomicBool::new(false),
            }),
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.inner.metrics)
    }

    /// Mark draining state; `/readyz` starts answering 503.
    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }
}
