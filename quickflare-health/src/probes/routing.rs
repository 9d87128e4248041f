//! Routing table and resolver probes

use super::{
    first_ipv4_token, Platform, ProbeContext, ProbeError, ProbeResult, SignalProbe,
    TUNNEL_IFACE_PREFIXES,
};
use crate::signal::Signal;
use async_trait::async_trait;

/// Address prefixes commonly handed out by VPN clients.
const VPN_ROUTE_PREFIXES: &[&str] = &["100.96.", "100.64.", "10.8.", "10.2.", "172.16."];

/// Resolvers pushed by well-known VPN providers. Entries ending in `.` match a range.
const VPN_DNS_SERVERS: &[(&str, &str)] = &[
    ("1.1.1.1", "Cloudflare WARP"),
    ("1.0.0.1", "Cloudflare WARP"),
    ("103.86.96.", "NordVPN"),
    ("103.86.99.", "NordVPN"),
    ("10.8.0.", "OpenVPN"),
    ("162.252.172.", "ProtonVPN"),
];

/// Whether a routing table dump mentions VPN ranges or tunnel interfaces.
pub(crate) fn routes_look_tunnelled(output: &str) -> bool {
    output.split_whitespace().any(|token| {
        let token = token.to_ascii_lowercase();
        VPN_ROUTE_PREFIXES.iter().any(|p| token.starts_with(p))
            || TUNNEL_IFACE_PREFIXES.iter().any(|p| {
                token
                    .strip_prefix(p)
                    .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
            })
    })
}

/// Nameservers listed in a resolv.conf.
pub(crate) fn parse_resolv_conf(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some("nameserver"), Some(addr)) => Some(addr.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// DNS servers from `ipconfig /all`, including continuation lines.
pub(crate) fn parse_windows_dns(text: &str) -> Vec<String> {
    let mut servers = Vec::new();
    let mut in_block = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some((key, value)) = trimmed.split_once(" : ") {
            in_block = key.starts_with("DNS Servers");
            if in_block {
                servers.extend(first_ipv4_token(value));
            }
        } else if in_block {
            match first_ipv4_token(trimmed) {
                Some(addr) if trimmed == addr => servers.push(addr),
                _ => in_block = false,
            }
        }
    }
    servers
}

/// Servers that belong to a known VPN provider, formatted as `addr (provider)`.
pub(crate) fn match_vpn_dns(servers: &[String]) -> Vec<String> {
    servers
        .iter()
        .filter_map(|server| {
            VPN_DNS_SERVERS
                .iter()
                .find(|(known, _)| {
                    if known.ends_with('.') {
                        server.starts_with(known)
                    } else {
                        server.as_str() == *known
                    }
                })
                .map(|(_, provider)| format!("{server} ({provider})"))
        })
        .collect()
}

/// Fires when routes point at VPN ranges or tunnel interfaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingProbe;

#[async_trait]
impl SignalProbe for RoutingProbe {
    fn signal(&self) -> Signal {
        Signal::Routing
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let out = match ctx.platform() {
            Platform::Linux => ctx.run("ip", &["route"]).await?,
            Platform::MacOs => ctx.run("netstat", &["-rn"]).await?,
            Platform::Windows => ctx.run("route", &["print", "0.0.0.0"]).await?,
            Platform::Other => return Err(ProbeError::Unsupported),
        };
        Ok(routes_look_tunnelled(&out.stdout))
    }
}

/// Fires when a configured resolver belongs to a VPN provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsProbe;

#[async_trait]
impl SignalProbe for DnsProbe {
    fn signal(&self) -> Signal {
        Signal::Dns
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let servers = match ctx.platform() {
            Platform::Windows => parse_windows_dns(&ctx.run("ipconfig", &["/all"]).await?.stdout),
            _ => parse_resolv_conf(&tokio::fs::read_to_string("/etc/resolv.conf").await?),
        };
        let vpn = match_vpn_dns(&servers);
        let detected = !vpn.is_empty();
        ctx.record(|d| {
            d.dns_servers = servers;
            d.vpn_dns = vpn;
        });
        Ok(detected)
    }
}
