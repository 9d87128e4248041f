//! Signal names, weights and the VPN decision rule

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Weighted confidence at or above which a VPN is reported.
pub const VPN_CONFIDENCE_THRESHOLD: f64 = 0.30;

/// One independently probed environment signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Default gateway mostly unreachable
    Gateway,
    /// A tun/tap/wireguard style interface exists
    VirtualInterface,
    /// Routing table carries VPN ranges or interfaces
    Routing,
    /// Resolver list contains VPN provider DNS
    Dns,
    /// Local address sits in a CGNAT/VPN range or differs from the public one
    IpMismatch,
    /// A competing VPN client is running
    VpnProcess,
    /// A VPN-like interface runs with a reduced MTU
    Mtu,
    /// First hops towards the gateway time out
    Traceroute,
    /// Gateway latency is unusually high
    Latency,
    /// Adapter description mentions a VPN product
    NetworkAdapter,
}

impl Signal {
    /// Every signal, in evaluation order.
    pub const ALL: [Signal; 10] = [
        Signal::Gateway,
        Signal::VirtualInterface,
        Signal::Routing,
        Signal::Dns,
        Signal::IpMismatch,
        Signal::VpnProcess,
        Signal::Mtu,
        Signal::Traceroute,
        Signal::Latency,
        Signal::NetworkAdapter,
    ];

    /// Contribution of this signal to the confidence score.
    pub fn weight(self) -> f64 {
        match self {
            Signal::Gateway => 0.08,
            Signal::VirtualInterface => 0.25,
            Signal::Routing => 0.15,
            Signal::Dns => 0.04,
            Signal::IpMismatch => 0.15,
            Signal::VpnProcess => 0.18,
            Signal::Mtu => 0.06,
            Signal::Traceroute => 0.03,
            Signal::Latency => 0.03,
            Signal::NetworkAdapter => 0.03,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Gateway => "gateway",
            Signal::VirtualInterface => "virtual_interface",
            Signal::Routing => "routing",
            Signal::Dns => "dns",
            Signal::IpMismatch => "ip_mismatch",
            Signal::VpnProcess => "vpn_process",
            Signal::Mtu => "mtu",
            Signal::Traceroute => "traceroute",
            Signal::Latency => "latency",
            Signal::NetworkAdapter => "network_adapter",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn detected(signals: &BTreeMap<Signal, bool>, signal: Signal) -> bool {
    signals.get(&signal).copied().unwrap_or(false)
}

/// Sum of the weights of detected signals, clamped to `[0, 1]`.
pub fn confidence(signals: &BTreeMap<Signal, bool>) -> f64 {
    let raw: f64 = signals
        .iter()
        .filter(|(_, hit)| **hit)
        .map(|(signal, _)| signal.weight())
        .sum();
    raw.clamp(0.0, 1.0)
}

/// Strong indicators flag a VPN even below the confidence threshold.
///
/// The combination is empirically tuned; revalidate against real traffic
/// before changing it.
pub fn strong_indicator(signals: &BTreeMap<Signal, bool>) -> bool {
    detected(signals, Signal::VirtualInterface)
        || detected(signals, Signal::IpMismatch)
        || (detected(signals, Signal::Routing) && detected(signals, Signal::VpnProcess))
}

/// Final VPN verdict for a set of signals and their confidence.
pub fn vpn_detected(signals: &BTreeMap<Signal, bool>, confidence: f64) -> bool {
    confidence >= VPN_CONFIDENCE_THRESHOLD || strong_indicator(signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(hits: &[Signal]) -> BTreeMap<Signal, bool> {
        Signal::ALL
            .iter()
            .map(|s| (*s, hits.contains(s)))
            .collect()
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = Signal::ALL.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_clamped_for_every_subset() {
        for mask in 0u32..(1 << Signal::ALL.len()) {
            let hits: Vec<Signal> = Signal::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| *s)
                .collect();
            let c = confidence(&only(&hits));
            assert!((0.0..=1.0).contains(&c), "mask {mask:#b} gave {c}");
        }
    }

    #[test]
    fn test_all_signals_clamp_to_one() {
        let signals = only(&Signal::ALL);
        assert!(confidence(&signals) <= 1.0);
        assert!(vpn_detected(&signals, confidence(&signals)));
    }

    #[test]
    fn test_virtual_interface_alone_overrides_threshold() {
        let signals = only(&[Signal::VirtualInterface]);
        let c = confidence(&signals);
        assert!((c - 0.25).abs() < 1e-9);
        assert!(c < VPN_CONFIDENCE_THRESHOLD);
        assert!(vpn_detected(&signals, c));
    }

    #[test]
    fn test_routing_and_process_override() {
        let signals = only(&[Signal::Routing, Signal::VpnProcess]);
        assert!(strong_indicator(&signals));
        assert!(vpn_detected(&signals, 0.0));
    }

    #[test]
    fn test_routing_alone_is_not_enough() {
        let signals = only(&[Signal::Routing]);
        assert!(!vpn_detected(&signals, confidence(&signals)));
    }

    #[test]
    fn test_nothing_detected() {
        let signals = only(&[]);
        assert_eq!(confidence(&signals), 0.0);
        assert!(!vpn_detected(&signals, 0.0));
    }

    #[test]
    fn test_weak_signals_reach_threshold() {
        let signals = only(&[
            Signal::Gateway,
            Signal::Dns,
            Signal::Mtu,
            Signal::Traceroute,
            Signal::Latency,
            Signal::NetworkAdapter,
        ]);
        // 0.08 + 0.04 + 0.06 + 0.03 * 3 = 0.27
        assert!(!vpn_detected(&signals, confidence(&signals)));

        let mut more = signals.clone();
        more.insert(Signal::VpnProcess, true);
        assert!(vpn_detected(&more, confidence(&more)));
    }
}
