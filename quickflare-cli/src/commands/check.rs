//! Check subcommand: run the health gate and report

use super::{CheckFlags, LogArgs};
use anyhow::Result;
use clap::Args;
use quickflare::prelude::*;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub checks: CheckFlags,

    #[command(flatten)]
    pub log: LogArgs,

    /// Timeout for each probe, in seconds
    #[arg(long, default_value_t = 5)]
    pub probe_timeout: u64,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: CheckArgs) -> Result<ExitCode> {
    args.log.init();

    let config = HealthCheckConfig {
        probe_timeout: Duration::from_secs(args.probe_timeout),
        ..args.checks.health_config()
    };
    let status = HealthGate::system().evaluate_with(&config).await;
    let blocked = status.blocking_reason(&config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_report(&status, &config);
        match blocked {
            Some(reason) => println!("\nTunnel would be refused: {reason}"),
            None => println!("\nTunnel may start"),
        }
    }

    Ok(if blocked.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn mark(hit: bool) -> &'static str {
    if hit {
        "x"
    } else {
        " "
    }
}

fn print_report(status: &HealthStatus, config: &HealthCheckConfig) {
    if config.internet {
        let online = if status.internet_online { "online" } else { "offline" };
        println!("Internet: {online}");
    } else {
        println!("Internet: not checked");
    }

    if !config.vpn {
        println!("VPN: not checked");
        return;
    }
    println!(
        "VPN: {} (confidence {:.2})",
        if status.vpn_detected { "detected" } else { "not detected" },
        status.vpn_confidence
    );
    for (signal, hit) in &status.signals {
        let note = status
            .unavailable
            .get(signal)
            .map(|reason| format!("  ({reason})"))
            .unwrap_or_default();
        println!(
            "  [{}] {:<18} {:.2}{}",
            mark(*hit),
            signal.name(),
            signal.weight(),
            note
        );
    }

    let details = &status.details;
    if let Some(gateway) = details.gateway {
        match details.gateway_latency_ms {
            Some(ms) => println!("Gateway: {gateway} ({ms:.1} ms)"),
            None => println!("Gateway: {gateway}"),
        }
    }
    if let Some(ip) = details.local_ip {
        println!("Local IP: {ip}");
    }
    if let Some(ip) = details.public_ip {
        println!("Public IP: {ip}");
    }
}
