use crate::config::{Config, TelemetryConfig};
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

pub const DEFAULT_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Main metrics structure containing all Prometheus metrics
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,
    started_at: Instant,

    // HTTP Metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
    pub active_connections: IntGauge,

    // Analysis Metrics
    pub analysis_requests: IntCounterVec,
    pub scorer_duration: HistogramVec,
    pub scorer_failures: IntCounterVec,

    // System Metrics
    pub uptime_seconds: IntGauge,
}

impl Metrics {
    /// Create a new Metrics instance with all configured Prometheus metrics
    pub fn new(buckets: &[f64]) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let buckets = if buckets.is_empty() {
            DEFAULT_BUCKETS.to_vec()
        } else {
            buckets.to_vec()
        };

        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "sentiment_http_requests_total",
                "Total number of HTTP requests received",
            ),
            &["method", "endpoint", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "sentiment_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(buckets.clone()),
            &["method", "endpoint", "status"],
        )?;

        let active_connections = IntGauge::new(
            "sentiment_connections_active",
            "Number of requests currently being served",
        )?;

        let analysis_requests = IntCounterVec::new(
            Opts::new(
                "sentiment_analysis_requests_total",
                "Total number of analysis requests by outcome",
            ),
            &["endpoint", "outcome"],
        )?;

        let scorer_duration = HistogramVec::new(
            HistogramOpts::new(
                "sentiment_scorer_duration_seconds",
                "Time spent in a single scorer call",
            )
            .buckets(buckets),
            &["scorer", "status"],
        )?;

        let scorer_failures = IntCounterVec::new(
            Opts::new(
                "sentiment_scorer_failures_total",
                "Total number of scorer failures by fault policy",
            ),
            &["scorer", "policy"],
        )?;

        let uptime_seconds =
            IntGauge::new("sentiment_system_uptime_seconds", "Service uptime in seconds")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(analysis_requests.clone()))?;
        registry.register(Box::new(scorer_duration.clone()))?;
        registry.register(Box::new(scorer_failures.clone()))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry,
            started_at: Instant::now(),
            http_requests_total,
            http_request_duration,
            active_connections,
            analysis_requests,
            scorer_duration,
            scorer_failures,
            uptime_seconds,
        })
    }

    #[inline(always)]
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    #[inline(always)]
    pub fn record_http_request(&self, method: &str, endpoint: &str, status: u16, duration: f64) {
        let status_str = status.to_string();

        self.http_requests_total
            .with_label_values(&[method, endpoint, &status_str])
            .inc();

        self.http_request_duration
            .with_label_values(&[method, endpoint, &status_str])
            .observe(duration);
    }

    #[inline(always)]
    pub fn record_analysis(&self, endpoint: &str, outcome: &str) {
        self.analysis_requests
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    #[inline(always)]
    pub fn record_scorer(&self, scorer: &str, duration: f64, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.scorer_duration
            .with_label_values(&[scorer, status])
            .observe(duration);
    }

    #[inline(always)]
    pub fn record_scorer_failure(&self, scorer: &str, policy: &str) {
        self.scorer_failures
            .with_label_values(&[scorer, policy])
            .inc();
    }

    #[inline(always)]
    pub fn update_system_metrics(&self) {
        self.uptime_seconds
            .set(self.started_at.elapsed().as_secs() as i64);
    }
}

/// Installs the W3C trace-context propagator when telemetry is enabled.
pub fn init_tracer(config: &TelemetryConfig) -> bool {
    if !config.enabled {
        return false;
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    tracing::info!("Telemetry configured for service: {}", config.service_name);

    true
}

/// Initialize telemetry with tracing and metrics
///
/// Records emitted through `log`, such as actix access logs, are forwarded to the subscriber.
pub fn init_telemetry(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = TracingRegistry::default().with(env_filter);

    if config.logging.enable_json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true);

        subscriber.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(config.logging.enable_color);

        subscriber.with(fmt_layer).try_init()?;
    }

    init_tracer(&config.telemetry);

    tracing::info!(
        "Telemetry initialized with level: {}, format: {}",
        config.logging.level,
        config.logging.format
    );

    Ok(())
}
