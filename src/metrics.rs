// src/metrics.rs
//! Prometheus exporter and metric descriptions for the client counters.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize Prometheus recorder and expose a static gauge for the default cache TTL.
    pub fn init(default_ttl_ms: u64) -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;

        describe_client_metrics();
        gauge!("client_default_ttl_ms").set(default_ttl_ms as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_client_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "client_cache_hits_total",
            "Fetches answered from a fresh cache entry."
        );
        describe_counter!(
            "client_network_calls_total",
            "Upstream network calls started."
        );
        describe_counter!(
            "client_joined_total",
            "Fetches that joined an in-flight call instead of starting one."
        );
        describe_counter!(
            "client_fetch_failures_total",
            "Upstream calls that ended in a runtime error."
        );
        describe_histogram!("client_fetch_ms", "Upstream call duration in milliseconds.");
        describe_gauge!("client_default_ttl_ms", "Default cache freshness window.");
    });
}
