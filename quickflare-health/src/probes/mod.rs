//! Environment signal probes
//!
//! Each probe inspects one aspect of the host (interfaces, routes, resolvers,
//! running processes, ...) by running a platform command and parsing its
//! output. Probes never fail the gate: any error is reported back as
//! "unavailable" and counted as not detected.

mod address;
mod command;
mod gateway;
mod interfaces;
mod process;
mod routing;

pub use address::IpMismatchProbe;
pub use gateway::{GatewayProbe, LatencyProbe, TracerouteProbe};
pub use interfaces::{MtuProbe, NetworkAdapterProbe, VirtualInterfaceProbe};
pub use process::VpnProcessProbe;
pub use routing::{DnsProbe, RoutingProbe};

pub(crate) use command::CommandOutput;
pub(crate) use gateway::first_ipv4;

use crate::signal::Signal;
use crate::status::HealthDetails;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Host operating system family, used to pick commands and output parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(any(target_os = "linux", target_os = "android")) {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// Why a probe could not produce a verdict
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not supported on this platform")]
    Unsupported,

    #[error("no default gateway")]
    NoGateway,

    #[error("probe panicked")]
    Panicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProbeResult = std::result::Result<bool, ProbeError>;

/// Shared state handed to every probe of one evaluation.
pub struct ProbeContext {
    platform: Platform,
    command_timeout: Duration,
    gateway: OnceCell<Option<Ipv4Addr>>,
    details: Mutex<HealthDetails>,
}

impl ProbeContext {
    pub fn new(platform: Platform, command_timeout: Duration) -> Self {
        Self {
            platform,
            command_timeout,
            gateway: OnceCell::new(),
            details: Mutex::new(HealthDetails::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Default IPv4 gateway, looked up once per evaluation.
    pub async fn gateway(&self) -> Option<Ipv4Addr> {
        *self
            .gateway
            .get_or_init(|| async {
                match gateway::lookup_gateway(self).await {
                    Ok(gw) => gw,
                    Err(e) => {
                        tracing::debug!("Gateway lookup failed: {}", e);
                        None
                    }
                }
            })
            .await
    }

    /// Record diagnostic details.
    pub fn record(&self, update: impl FnOnce(&mut HealthDetails)) {
        if let Ok(mut details) = self.details.lock() {
            update(&mut details);
        }
    }

    /// Run a command under the context's timeout.
    pub(crate) async fn run(
        &self,
        program: &str,
        args: &[&str],
    ) -> std::result::Result<CommandOutput, ProbeError> {
        command::run_command(program, args, self.command_timeout).await
    }

    pub(crate) fn take_details(&self) -> HealthDetails {
        let mut details = self
            .details
            .lock()
            .map(|mut d| std::mem::take(&mut *d))
            .unwrap_or_default();
        if details.gateway.is_none() {
            details.gateway = self.gateway.get().copied().flatten();
        }
        details
    }
}

/// A single weighted VPN signal.
#[async_trait]
pub trait SignalProbe: Send + Sync {
    /// The signal this probe reports.
    fn signal(&self) -> Signal;

    /// Inspect the host. `Ok(true)` means the signal fired.
    async fn detect(&self, ctx: &ProbeContext) -> ProbeResult;
}

/// Probe with a preset answer.
///
/// Used to pin a signal when embedding the gate, and by tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    signal: Signal,
    detected: bool,
}

impl FixedProbe {
    pub fn new(signal: Signal, detected: bool) -> Self {
        Self { signal, detected }
    }
}

#[async_trait]
impl SignalProbe for FixedProbe {
    fn signal(&self) -> Signal {
        self.signal
    }

    async fn detect(&self, _ctx: &ProbeContext) -> ProbeResult {
        Ok(self.detected)
    }
}

/// The ten host probes, one per signal.
pub fn system_probes() -> Vec<Arc<dyn SignalProbe>> {
    vec![
        Arc::new(GatewayProbe),
        Arc::new(VirtualInterfaceProbe),
        Arc::new(RoutingProbe),
        Arc::new(DnsProbe),
        Arc::new(IpMismatchProbe::default()),
        Arc::new(VpnProcessProbe),
        Arc::new(MtuProbe),
        Arc::new(TracerouteProbe),
        Arc::new(LatencyProbe),
        Arc::new(NetworkAdapterProbe),
    ]
}

/// Interface name prefixes used by tunnel drivers.
pub(crate) const TUNNEL_IFACE_PREFIXES: &[&str] = &["tun", "tap", "utun", "ppp", "wg", "ipsec"];

/// Product words that show up in VPN interface and adapter names.
pub(crate) const VPN_PRODUCT_WORDS: &[&str] = &[
    "warp",
    "cloudflare",
    "vpn",
    "wireguard",
    "wintun",
    "nord",
    "proton",
    "mullvad",
    "pia",
    "tunnelblick",
    "openvpn",
    "viscosity",
    "pritunl",
    "tap-windows",
];

/// First IPv4 address in `text`, as written.
pub(crate) fn first_ipv4_token(text: &str) -> Option<String> {
    first_ipv4(text).map(|addr| addr.to_string())
}

/// Whether an interface name or adapter description looks like a VPN.
pub(crate) fn is_vpn_like(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let lower = lower.trim();
    TUNNEL_IFACE_PREFIXES.iter().any(|p| lower.starts_with(p))
        || VPN_PRODUCT_WORDS.iter().any(|w| lower.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vpn_like_names() {
        assert!(is_vpn_like("wg0"));
        assert!(is_vpn_like("utun3"));
        assert!(is_vpn_like("CloudflareWARP"));
        assert!(is_vpn_like("NordLynx"));
        assert!(is_vpn_like("TAP-Windows Adapter V9"));
        assert!(!is_vpn_like("eth0"));
        assert!(!is_vpn_like("en0"));
        assert!(!is_vpn_like("Intel(R) Ethernet Connection"));
    }

    #[test]
    fn test_system_probes_cover_every_signal() {
        let probes = system_probes();
        let mut signals: Vec<Signal> = probes.iter().map(|p| p.signal()).collect();
        signals.sort();
        let mut all = Signal::ALL.to_vec();
        all.sort();
        assert_eq!(signals, all);
    }

    #[tokio::test]
    async fn test_context_records_details() {
        let ctx = ProbeContext::new(Platform::Linux, Duration::from_secs(1));
        ctx.record(|d| d.dns_servers.push("1.1.1.1".into()));
        ctx.record(|d| d.dns_servers.push("8.8.8.8".into()));
        let details = ctx.take_details();
        assert_eq!(details.dns_servers, vec!["1.1.1.1", "8.8.8.8"]);
        assert!(ctx.take_details().dns_servers.is_empty());
    }
}
