//! Local versus public address probe

use super::{ProbeContext, ProbeResult, SignalProbe};
use crate::signal::Signal;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Local address prefixes that indicate a VPN or carrier-grade NAT egress.
const TUNNEL_ADDRESS_PREFIXES: &[&str] = &["100.64.", "100.96.", "172.16.", "10.8.", "10.2."];

const DEFAULT_ECHO_URL: &str = "https://api.ipify.org";

/// Whether `addr` is a non-routable address (RFC 1918, loopback, link local or CGNAT).
fn is_internal(addr: Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    addr.is_private() || addr.is_loopback() || addr.is_link_local() || (a == 100 && (64..128).contains(&b))
}

/// Decide the signal from the outbound local address and, when known, the public one.
pub(crate) fn address_mismatch(local: IpAddr, public: Option<IpAddr>) -> bool {
    let IpAddr::V4(local_v4) = local else {
        return false;
    };
    let text = local_v4.to_string();
    if TUNNEL_ADDRESS_PREFIXES.iter().any(|p| text.starts_with(p)) {
        return true;
    }
    // A routable local address that differs from the observed egress address
    matches!(public, Some(IpAddr::V4(public_v4)) if !is_internal(local_v4) && public_v4 != local_v4)
}

/// Address the host would use to reach the internet. No packets are sent.
async fn outbound_address() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
    socket.connect(SocketAddr::from(([8, 8, 8, 8], 80))).await?;
    Ok(socket.local_addr()?.ip())
}

/// Fires when the local address is in a VPN range or differs from the public one.
#[derive(Debug, Clone)]
pub struct IpMismatchProbe {
    echo_url: Option<String>,
    lookup_timeout: Duration,
}

impl Default for IpMismatchProbe {
    fn default() -> Self {
        Self {
            echo_url: Some(DEFAULT_ECHO_URL.to_string()),
            lookup_timeout: Duration::from_secs(3),
        }
    }
}

impl IpMismatchProbe {
    /// Probe that only looks at the local address.
    pub fn local_only() -> Self {
        Self {
            echo_url: None,
            ..Self::default()
        }
    }

    async fn public_address(&self) -> Option<IpAddr> {
        let url = self.echo_url.as_deref()?;
        let client = reqwest::Client::builder()
            .timeout(self.lookup_timeout)
            .build()
            .ok()?;
        let body = client
            .get(url)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .text()
            .await
            .ok()?;
        body.trim().parse().ok()
    }
}

#[async_trait]
impl SignalProbe for IpMismatchProbe {
    fn signal(&self) -> Signal {
        Signal::IpMismatch
    }

    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult {
        let local = outbound_address().await?;
        let public = self.public_address().await;
        if public.is_none() && self.echo_url.is_some() {
            tracing::debug!("Public address lookup failed");
        }
        ctx.record(|d| {
            d.local_ip = Some(local);
            d.public_ip = public;
        });
        Ok(address_mismatch(local, public))
    }
}
