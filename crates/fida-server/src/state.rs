//! Shared application state threaded through every handler via `State`.

use std::sync::Arc;

use fida_core::ratelimit::RateLimiter;
use fida_core::LedgerEngine;
use fida_spec::Config;

use crate::metrics::Metrics;

struct Inner {
    engine: LedgerEngine,
    rate_limiter: RateLimiter,
    config: Config,
    metrics: Metrics,
}

/// Cheap to clone; everything lives behind the inner `Arc`.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

impl AppState {
    /// Build the shared state from its components.
    pub fn new(engine: LedgerEngine, config: Config, metrics: Metrics) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_burst);
        Self(Arc::new(Inner {
            engine,
            rate_limiter,
            config,
            metrics,
        }))
    }

    /// The ledger engine facade.
    pub fn engine(&self) -> &LedgerEngine {
        &self.0.engine
    }

    /// The per-key-id token bucket limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.0.rate_limiter
    }

    /// Deployment configuration.
    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// The Prometheus metrics registry.
    pub fn metrics(&self) -> &Metrics {
        &self.0.metrics
    }
}
