//! Run subcommand: start a tunnel and keep it up until interrupted

use super::{build_runner, spawn_metrics_server, LogArgs, TunnelArgs};
use anyhow::{Context, Result};
use clap::Args;
use quickflare::SessionState;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    #[command(flatten)]
    pub log: LogArgs,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "QUICKFLARE_METRICS_BIND")]
    pub metrics_bind: Option<SocketAddr>,
}

pub async fn run(args: RunArgs) -> Result<ExitCode> {
    args.log.init();

    if let Some(addr) = args.metrics_bind {
        quickflare_observability::init_metrics();
        spawn_metrics_server(addr);
    }

    let runner = build_runner(&args.tunnel)?;
    info!(
        "Starting quickflare v{} for local port {}",
        env!("CARGO_PKG_VERSION"),
        args.tunnel.port
    );

    match runner.start().await {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!("Tunnel is running but has not reported a URL yet");
            if let Some(known) = runner.last_known_url().await {
                info!("Last known URL: {}", known);
            }
        }
        Err(e) if e.is_blocked() => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("failed to start tunnel"),
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down...");
                break;
            }
            _ = ticker.tick() => {
                let status = runner.status().await;
                if status.state == SessionState::Failed {
                    error!(
                        "Tunnel exited: {}",
                        status.error.as_deref().unwrap_or("unknown reason")
                    );
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    if let Err(e) = runner.stop().await {
        warn!("Tunnel did not stop cleanly: {}", e);
    }
    Ok(ExitCode::SUCCESS)
}
