//! Verify subcommand: end-to-end smoke test of the tunnel

use super::{build_runner, LogArgs, TunnelArgs};
use anyhow::Result;
use clap::Args;
use quickflare::Runner;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Checks that must pass for the run to count as verified.
const REQUIRED_PASSES: usize = 2;
const REQUEST_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    #[command(flatten)]
    pub log: LogArgs,

    /// Timeout for each request through the tunnel, in seconds
    #[arg(long, default_value_t = 20)]
    pub request_timeout: u64,
}

struct Check {
    name: &'static str,
    outcome: std::result::Result<String, String>,
}

pub async fn run(args: VerifyArgs) -> Result<ExitCode> {
    args.log.init();
    let runner = build_runner(&args.tunnel)?;
    let mut checks = Vec::with_capacity(3);

    let health = runner.check_health().await;
    checks.push(Check {
        name: "health gate",
        outcome: match health.blocking_reason(&runner.config().health_checks) {
            None => Ok(format!("vpn confidence {:.2}", health.vpn_confidence)),
            Some(reason) => Err(reason.to_string()),
        },
    });

    let url = match runner.start().await {
        Ok(Some(url)) => {
            checks.push(Check {
                name: "tunnel url",
                outcome: Ok(url.clone()),
            });
            Some(url)
        }
        Ok(None) => {
            checks.push(Check {
                name: "tunnel url",
                outcome: Err("no URL reported before the timeout".to_string()),
            });
            None
        }
        Err(e) => {
            checks.push(Check {
                name: "tunnel url",
                outcome: Err(e.to_string()),
            });
            None
        }
    };

    let request = match &url {
        Some(url) => request_through(url, Duration::from_secs(args.request_timeout)).await,
        None => Err("skipped, no tunnel URL".to_string()),
    };
    checks.push(Check {
        name: "public request",
        outcome: request,
    });

    shutdown(&runner).await;

    let passed = checks.iter().filter(|c| c.outcome.is_ok()).count();
    for check in &checks {
        match &check.outcome {
            Ok(detail) => println!("PASS  {:<15} {}", check.name, detail),
            Err(detail) => println!("FAIL  {:<15} {}", check.name, detail),
        }
    }
    println!("{passed}/{} checks passed", checks.len());

    Ok(if passed >= REQUIRED_PASSES {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// GET the public URL until the edge answers with a non-5xx status.
async fn request_through(url: &str, timeout: Duration) -> std::result::Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| e.to_string())?;

    let mut last_error = String::new();
    for attempt in 1..=REQUEST_ATTEMPTS {
        match client.get(url).send().await {
            Ok(response) if !response.status().is_server_error() => {
                info!("Tunnel answered with {}", response.status());
                return Ok(format!("HTTP {}", response.status().as_u16()));
            }
            Ok(response) => last_error = format!("HTTP {}", response.status().as_u16()),
            Err(e) => last_error = e.to_string(),
        }
        debug!("Attempt {}/{} failed: {}", attempt, REQUEST_ATTEMPTS, last_error);
        if attempt < REQUEST_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    Err(last_error)
}

async fn shutdown(runner: &Runner) {
    if let Err(e) = runner.stop().await {
        warn!("Failed to stop tunnel cleanly: {}", e);
    }
}
