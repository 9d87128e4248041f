pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_filter, LogFormat};
pub use metrics::{
    gather_metrics, init_metrics, metrics_enabled, tunnel_metrics, TunnelMetrics, REGISTRY,
};

/// Minimal logging setup: compact output, `info` unless `RUST_LOG` says otherwise
pub fn init_minimal_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
