//! Prometheus metrics for tunnel sessions
//!
//! Metrics are registered once into [`REGISTRY`] by [`init_metrics`]. Until
//! then [`tunnel_metrics`] returns `None` and callers skip recording.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static METRICS: OnceLock<TunnelMetrics> = OnceLock::new();

/// Session and health gate metrics.
#[derive(Debug, Clone)]
pub struct TunnelMetrics {
    health_evaluations: IntCounterVec,
    sessions: IntCounterVec,
    active_sessions: IntGauge,
    url_capture_seconds: Histogram,
}

impl TunnelMetrics {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let health_evaluations = IntCounterVec::new(
            Opts::new(
                "quickflare_health_evaluations_total",
                "Health gate evaluations by verdict",
            ),
            &["verdict"],
        )?;
        let sessions = IntCounterVec::new(
            Opts::new(
                "quickflare_sessions_total",
                "Tunnel session transitions by backend and outcome",
            ),
            &["backend", "outcome"],
        )?;
        let active_sessions =
            IntGauge::new("quickflare_active_sessions", "Tunnel sessions currently running")?;
        let url_capture_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "quickflare_url_capture_seconds",
                "Time from backend start to URL capture",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(health_evaluations.clone()))?;
        registry.register(Box::new(sessions.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(url_capture_seconds.clone()))?;

        Ok(Self {
            health_evaluations,
            sessions,
            active_sessions,
            url_capture_seconds,
        })
    }

    pub fn record_health(&self, passed: bool) {
        let verdict = if passed { "pass" } else { "blocked" };
        self.health_evaluations.with_label_values(&[verdict]).inc();
    }

    pub fn session_started(&self, backend: &str) {
        self.sessions.with_label_values(&[backend, "started"]).inc();
        self.active_sessions.inc();
    }

    /// `outcome` is free-form, e.g. `stopped` or `exited`.
    pub fn session_finished(&self, backend: &str, outcome: &str) {
        self.sessions.with_label_values(&[backend, outcome]).inc();
        self.active_sessions.dec();
    }

    pub fn observe_url_capture(&self, elapsed: Duration) {
        self.url_capture_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }
}

/// Register the metrics. Safe to call more than once.
pub fn init_metrics() -> &'static TunnelMetrics {
    METRICS.get_or_init(|| {
        #[cfg(target_os = "linux")]
        {
            let _ = REGISTRY.register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ));
        }
        TunnelMetrics::register(&REGISTRY).expect("metric names are unique")
    })
}

pub fn tunnel_metrics() -> Option<&'static TunnelMetrics> {
    METRICS.get()
}

pub fn metrics_enabled() -> bool {
    METRICS.get().is_some()
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_metrics() as *const TunnelMetrics;
        let second = init_metrics() as *const TunnelMetrics;
        assert_eq!(first, second);
        assert!(metrics_enabled());
        assert!(tunnel_metrics().is_some());
    }

    #[test]
    fn test_gather_contains_recorded_metrics() {
        let metrics = init_metrics();
        metrics.record_health(false);
        metrics.session_started("process");
        metrics.observe_url_capture(Duration::from_millis(1500));
        metrics.session_finished("process", "stopped");

        let text = gather_metrics();
        assert!(text.contains("quickflare_health_evaluations_total{verdict=\"blocked\"}"));
        assert!(text.contains("quickflare_sessions_total{backend=\"process\",outcome=\"started\"}"));
        assert!(text.contains("quickflare_url_capture_seconds_bucket"));
        assert!(text.contains("quickflare_active_sessions"));
    }
}
