//! Prometheus metrics registry, rendered at `/metrics`.

use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

/// The service's Prometheus registry and the counters/histograms it exposes.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Requests by route and outcome (`status` label carries the HTTP code).
    pub requests_total: IntCounterVec,
    /// Request latency in milliseconds, by route.
    pub request_latency_ms: HistogramVec,
    /// Events issued, by tenant.
    pub events_issued_total: IntCounterVec,
    /// Checkpoints cut, by tenant.
    pub checkpoints_total: IntCounterVec,
}

impl Metrics {
    /// Build and register all collectors on a fresh registry.
    pub fn new() -> Self {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            prometheus::Opts::new("fida_requests_total", "Total HTTP requests by route and status"),
            &["route", "status"],
        )
        .expect("register requests_total");
        let request_latency_ms = HistogramVec::new(
            prometheus::HistogramOpts::new("fida_request_latency_ms", "Request latency in milliseconds"),
            &["route"],
        )
        .expect("register request_latency_ms");
        let events_issued_total = IntCounterVec::new(
            prometheus::Opts::new("fida_events_issued_total", "Events issued, by tenant"),
            &["tenant_id"],
        )
        .expect("register events_issued_total");
        let checkpoints_total = IntCounterVec::new(
            prometheus::Opts::new("fida_checkpoints_total", "Checkpoints cut, by tenant"),
            &["tenant_id"],
        )
        .expect("register checkpoints_total");

        registry.register(Box::new(requests_total.clone())).expect("register");
        registry.register(Box::new(request_latency_ms.clone())).expect("register");
        registry.register(Box::new(events_issued_total.clone())).expect("register");
        registry.register(Box::new(checkpoints_total.clone())).expect("register");

        Self {
            registry,
            requests_total,
            request_latency_ms,
            events_issued_total,
            checkpoints_total,
        }
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
