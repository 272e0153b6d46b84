// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metric descriptions (so series show up on /metrics with help text).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "trends_source_fetch_total",
            "Source fetch attempts by source and outcome."
        );
        describe_counter!(
            "trends_cache_hits_total",
            "Source reads served from the TTL cache."
        );
        describe_counter!(
            "trends_breaker_trips_total",
            "Times a source circuit breaker opened."
        );
        describe_histogram!("trends_fetch_ms", "Source fetch latency in milliseconds.");
        describe_counter!(
            "trends_dedup_dropped_total",
            "Candidates dropped as near-duplicates."
        );
        describe_counter!(
            "trends_bridged_total",
            "Ranked candidates that needed a bridge sentence."
        );
        describe_counter!("trends_refresh_total", "Completed refresh cycles.");
        describe_gauge!(
            "trends_last_refresh_ts",
            "Unix ts of the last published refresh."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if a recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
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
