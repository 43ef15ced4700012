//! Prometheus Metrics Definitions
//!
//! Defines the Quill metrics and exposes them at `/metrics` for scraping.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec, Encoder,
    HistogramVec, IntGaugeVec, TextEncoder,
};
use quill_storage::{CacheCoordinator, CacheStats};

use crate::error::{ApiError, ApiResult};

/// Request latency buckets, in seconds.
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance, registered once on first use.
pub static METRICS: Lazy<ApiResult<QuillMetrics>> = Lazy::new(QuillMetrics::new);

#[derive(Clone)]
pub struct QuillMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// labels: route
    pub rate_limit_rejections_total: CounterVec,

    /// Cache coordinator reads since start. labels: outcome (hit/miss/unavailable)
    pub cache_reads: IntGaugeVec,

    /// Edge response cache activity. labels: outcome (hit/miss/store)
    pub edge_cache_total: CounterVec,
}

impl QuillMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "quill_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "quill_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            rate_limit_rejections_total: register_counter_vec!(
                "quill_rate_limit_rejections_total",
                "Requests rejected by the rate limiter",
                &["route"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limit_rejections_total: {}", e)))?,

            cache_reads: register_int_gauge_vec!(
                "quill_cache_reads",
                "Cache coordinator reads since start by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_reads: {}", e)))?,

            edge_cache_total: register_counter_vec!(
                "quill_edge_cache_total",
                "Edge response cache lookups and stores",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register edge_cache_total: {}", e)))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_rate_limit_rejection(&self, route: &str) {
        self.rate_limit_rejections_total
            .with_label_values(&[route])
            .inc();
    }

    pub fn record_edge_cache(&self, outcome: &str) {
        self.edge_cache_total.with_label_values(&[outcome]).inc();
    }

    /// Copy the coordinator's counters into the cache gauges.
    pub fn set_cache_stats(&self, stats: CacheStats) {
        let outcomes = [
            ("hit", stats.hits),
            ("miss", stats.misses),
            ("unavailable", stats.unavailable),
        ];
        for (outcome, value) in outcomes {
            self.cache_reads
                .with_label_values(&[outcome])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        }
    }
}

/// Run `f` against the global metrics, ignoring a failed registration.
pub fn with_metrics(f: impl FnOnce(&QuillMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// GET /metrics - Prometheus scrape endpoint. Cache statistics are copied
/// into the gauges on every scrape.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    responses(
        (status = 200, description = "Prometheus text exposition", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler(State(cache): State<Arc<CacheCoordinator>>) -> impl IntoResponse {
    with_metrics(|metrics| metrics.set_cache_stats(cache.stats()));

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_http_request("GET", "/notes/{id}", 200, 0.015);
        metrics.record_rate_limit_rejection("/notes");
        metrics.record_edge_cache("hit");
        Ok(())
    }

    #[test]
    fn test_cache_gauges_follow_stats() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.set_cache_stats(CacheStats {
            hits: 7,
            misses: 3,
            unavailable: 1,
        });
        assert_eq!(metrics.cache_reads.with_label_values(&["hit"]).get(), 7);
        assert_eq!(metrics.cache_reads.with_label_values(&["unavailable"]).get(), 1);
        Ok(())
    }
}
