//! Subcommands and the flags they share

pub mod check;
pub mod run;
pub mod verify;
pub mod version;

use anyhow::{Context, Result};
use clap::Args;
use quickflare::prelude::*;
use quickflare::DownloadProgress;
use quickflare_observability::{gather_metrics, init_logging_with_filter, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info};

/// Which health checks to run
#[derive(Args, Debug)]
pub struct CheckFlags {
    /// Skip the internet reachability check
    #[arg(long, env = "QUICKFLARE_SKIP_INTERNET_CHECK")]
    pub skip_internet_check: bool,

    /// Skip VPN detection
    #[arg(long, env = "QUICKFLARE_SKIP_VPN_CHECK")]
    pub skip_vpn_check: bool,
}

impl CheckFlags {
    pub fn health_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            internet: !self.skip_internet_check,
            vpn: !self.skip_vpn_check,
            ..HealthCheckConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log filter, used when RUST_LOG is not set
    #[arg(long, default_value = "info", env = "QUICKFLARE_LOG")]
    pub log_level: String,

    /// Log format: pretty or json
    #[arg(long, default_value = "pretty", env = "QUICKFLARE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl LogArgs {
    pub fn init(&self) {
        if let Err(e) = init_logging_with_filter(self.log_format, &self.log_level) {
            eprintln!("Failed to initialize logging: {e}");
        }
    }
}

/// Tunnel flags shared by `run` and `verify`
#[derive(Args, Debug)]
pub struct TunnelArgs {
    /// Local port to expose
    #[arg(short, long, default_value_t = quickflare::common::DEFAULT_LOCAL_PORT, env = "QUICKFLARE_PORT")]
    pub port: u16,

    /// Tunnel binary or module. Searched for in ., binaries/ and binaries/<platform> if omitted
    #[arg(long, env = "QUICKFLARE_BINARY")]
    pub binary: Option<PathBuf>,

    /// Backend: auto, spawn or module
    #[arg(long, default_value = "auto", env = "QUICKFLARE_BACKEND")]
    pub backend: BackendHint,

    /// Seconds to wait for the public URL
    #[arg(long, default_value_t = 60, env = "QUICKFLARE_URL_TIMEOUT")]
    pub url_timeout: u64,

    /// File the captured URL is written to
    #[arg(long, default_value = quickflare::common::DEFAULT_URL_FILE, env = "QUICKFLARE_URL_FILE")]
    pub url_file: PathBuf,

    /// Do not persist the captured URL
    #[arg(long)]
    pub no_url_file: bool,

    #[command(flatten)]
    pub checks: CheckFlags,
}

/// Build a runner from the command line flags. The URL is printed to stdout
/// as soon as it is captured.
pub fn build_runner(args: &TunnelArgs) -> Result<Runner> {
    let mut builder = Runner::builder()
        .port(args.port)
        .url_wait_timeout(Duration::from_secs(args.url_timeout))
        .health_checks(args.checks.health_config())
        .backend(args.backend)
        .on_url_found(|url| println!("{url}"))
        .on_download_progress(|progress: DownloadProgress| {
            debug!(
                "Downloaded {}/{} bytes ({:.1}%)",
                progress.downloaded, progress.total, progress.percent
            );
        });
    if !args.no_url_file {
        builder = builder.url_file(&args.url_file);
    }
    if let Some(binary) = &args.binary {
        builder = builder.binary(binary);
    }
    builder.build().context("invalid tunnel configuration")
}

/// Serve `/metrics` and `/health/ready` in the background.
pub fn spawn_metrics_server(addr: SocketAddr) {
    tokio::spawn(async move {
        use axum::{routing::get, Router};
        let app = Router::new()
            .route("/metrics", get(|| async { gather_metrics() }))
            .route("/health/ready", get(|| async { "OK" }));
        info!("Metrics server listening on http://{}", addr);
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    error!("Metrics server error: {}", e);
                }
            }
            Err(e) => error!("Failed to bind metrics server to {}: {}", addr, e),
        }
    });
}
