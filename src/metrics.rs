// Prometheus metrics definitions for the Terra backend.

use std::sync::Once;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("terra_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    /// Oracle round trips, by prompt kind (action, opening, won, lost) and result.
    pub static ref ORACLE_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("terra_oracle_calls_total", "Oracle calls"),
        &["kind", "result"],
    )
    .unwrap();

    /// Oracle replies that could not be parsed and were replaced by the fallback.
    pub static ref ORACLE_FALLBACKS_TOTAL: IntCounter = IntCounter::new(
        "terra_oracle_fallbacks_total",
        "Unparseable oracle replies replaced by the fallback evaluation",
    )
    .unwrap();

    /// Sessions handed out, by kind (new, returning).
    pub static ref PLAYERS_REGISTERED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("terra_players_registered_total", "Sessions handed out"),
        &["kind"],
    )
    .unwrap();

    /// Finished games, by status and what happened to the leaderboard row.
    pub static ref GAMES_ENDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("terra_games_ended_total", "Finished games submitted"),
        &["status", "result"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Oracle latency in seconds, by prompt kind.
    pub static ref ORACLE_LATENCY_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("terra_oracle_latency_seconds", "Oracle latency in seconds")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0]),
        &["kind"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "terra_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(ORACLE_CALLS_TOTAL.clone()),
            Box::new(ORACLE_FALLBACKS_TOTAL.clone()),
            Box::new(PLAYERS_REGISTERED_TOTAL.clone()),
            Box::new(GAMES_ENDED_TOTAL.clone()),
            Box::new(ORACLE_LATENCY_SECONDS.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::error!("Failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Normalize a URL path for metric labels: replace numeric path segments with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Middleware counting and timing every request by route.
pub async fn track_metrics(req: Request, next: Next) -> Response {
    let endpoint = match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_path(req.uri().path()),
    };
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[&endpoint])
        .observe(start.elapsed().as_secs_f64());
    API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    response
}
