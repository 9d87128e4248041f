//! Gateway reachability, latency and traceroute probes

use super::{Platform, ProbeContext, ProbeError, ProbeResult, SignalProbe};
use crate::signal::Signal;
use async_trait::async_trait;
use std::net::Ipv4Addr;

const PING_ATTEMPTS: usize = 3;

/// Average gateway round trip above which the latency signal fires.
const LATENCY_THRESHOLD_MS: f64 = 15.0;

/// Timed-out hops within the first three above which traceroute fires.
const TRACEROUTE_TIMEOUT_LIMIT: usize = 2;

/// First IPv4 address appearing anywhere in `line`.
pub(crate) fn first_ipv4(line: &str) -> Option<Ipv4Addr> {
    line.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find_map(|token| token.parse().ok())
}

/// Extract the default gateway from `ip route` / `route -n get` / `ipconfig` output.
pub(crate) fn parse_default_gateway(platform: Platform, output: &str) -> Option<Ipv4Addr> {
    match platform {
        Platform::Linux | Platform::Other => output.lines().find_map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some("default"), Some("via"), Some(addr)) => addr.parse().ok(),
                _ => None,
            }
        }),
        Platform::MacOs => output
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("gateway:").and_then(first_ipv4)),
        Platform::Windows => output
            .lines()
            .filter(|line| line.contains("Default Gateway"))
            .find_map(|line| line.split_once(':').and_then(|(_, v)| first_ipv4(v))),
    }
}

pub(crate) async fn lookup_gateway(ctx: &ProbeContext) -> Result<Option<Ipv4Addr>, ProbeError> {
    let out = match ctx.platform() {
        Platform::Linux => ctx.run("ip", &["route", "show", "default"]).await?,
        Platform::MacOs => ctx.run("route", &["-n", "get", "default"]).await?,
        Platform::Windows => ctx.run("ipconfig", &[]).await?,
        Platform::Other => return Err(ProbeError::Unsupported),
    };
    Ok(parse_default_gateway(ctx.platform(), &out.stdout))
}

fn ping_args(platform: Platform, target: &str) -> (&'static str, Vec<String>) {
    let target = target.to_string();
    match platform {
        Platform::Windows => (
            "ping",
            vec!["-n".into(), "1".into(), "-w".into(), "1000".into(), target],
        ),
        // macOS takes the wait time in milliseconds
        Platform::MacOs => (
            "ping",
            vec!["-c".into(), "1".into(), "-W".into(), "1000".into(), target],
        ),
        Platform::Linux | Platform::Other => (
            "ping",
            vec!["-c".into(), "1".into(), "-W".into(), "1".into(), target],
        ),
    }
}

async fn ping_once(ctx: &ProbeContext, target: Ipv4Addr) -> Result<super::CommandOutput, ProbeError> {
    let (program, args) = ping_args(ctx.platform(), &target.to_string());
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    ctx.run(program, &args).await
}

/// Round trip time from one ping reply, in milliseconds.
///
/// Handles `time=12.3 ms`, `time=4ms` and the Windows `time<1ms` form.
pub(crate) fn parse_ping_time(output: &str) -> Option<f64> {
    let idx = output.find("time=").or_else(|| output.find("time<"))?;
    let rest = &output[idx + 5..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Count hops that timed out in traceroute / tracert output.
pub(crate) fn count_traceroute_timeouts(platform: Platform, output: &str) -> usize {
    let hops = output
        .lines()
        .filter(|line| {
            line.trim_start()
                .split_whitespace()
                .next()
                .is_some_and(|first| first.parse::<u8>().is_ok())
        });
    match platform {
        // A hop that timed out shows "*" for every attempt and no timings.
        Platform::Windows => hops.filter(|line| !line.contains("ms")).count(),
        _ => hops
            .filter(|line| {
                line.split_whitespace()
                    .skip(1)
                    .all(|token| token == "*")
            })
            .count(),
    }
}

/// Fires when the default gateway answers fewer than two of three pings.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayProbe;

#[async_trait]
impl SignalProbe for GatewayProbe {
    fn signal(&self) -> Signal {
        Signal::Gateway
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let gateway = ctx.gateway().await.ok_or(ProbeError::NoGateway)?;
        let mut answered = 0;
        for _ in 0..PING_ATTEMPTS {
            if ping_once(ctx, gateway).await.is_ok_and(|out| out.success) {
                answered += 1;
            }
        }
        tracing::trace!(%gateway, answered, "Gateway ping");
        Ok(answered < 2)
    }
}

/// Fires when the average gateway round trip exceeds 15 ms.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyProbe;

#[async_trait]
impl SignalProbe for LatencyProbe {
    fn signal(&self) -> Signal {
        Signal::Latency
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let gateway = ctx.gateway().await.ok_or(ProbeError::NoGateway)?;
        let mut samples = Vec::with_capacity(PING_ATTEMPTS);
        for _ in 0..PING_ATTEMPTS {
            if let Ok(out) = ping_once(ctx, gateway).await {
                if out.success {
                    samples.extend(parse_ping_time(&out.stdout));
                }
            }
        }
        if samples.is_empty() {
            return Ok(false);
        }

        #[allow(clippy::cast_precision_loss)]
        let average = samples.iter().sum::<f64>() / samples.len() as f64;
        ctx.record(|d| d.gateway_latency_ms = Some(average));
        Ok(average > LATENCY_THRESHOLD_MS)
    }
}

/// Fires when more than two of the first three hops time out.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracerouteProbe;

#[async_trait]
impl SignalProbe for TracerouteProbe {
    fn signal(&self) -> Signal {
        Signal::Traceroute
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let gateway = ctx.gateway().await.ok_or(ProbeError::NoGateway)?;
        let target = gateway.to_string();
        let out = match ctx.platform() {
            Platform::Windows => {
                ctx.run("tracert", &["-h", "3", "-w", "500", &target])
                    .await?
            }
            _ => {
                ctx.run("traceroute", &["-m", "3", "-w", "1", &target])
                    .await?
            }
        };
        let timeouts = count_traceroute_timeouts(ctx.platform(), &out.stdout);
        ctx.record(|d| d.traceroute_timeouts = Some(timeouts));
        Ok(timeouts > TRACEROUTE_TIMEOUT_LIMIT)
    }
}
