//! Health gate results

use crate::signal::Signal;
use quickflare_common::{BlockReason, HealthCheckConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

/// Diagnostic facts gathered while probing. Purely informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthDetails {
    pub gateway: Option<Ipv4Addr>,
    pub gateway_latency_ms: Option<f64>,
    pub local_ip: Option<IpAddr>,
    pub public_ip: Option<IpAddr>,
    pub dns_servers: Vec<String>,
    pub vpn_dns: Vec<String>,
    pub virtual_interfaces: Vec<String>,
    pub vpn_processes: Vec<String>,
    pub traceroute_timeouts: Option<usize>,
}

/// Outcome of one health gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Every reachability target answered
    pub internet_online: bool,
    /// Confidence or a strong indicator flagged a VPN
    pub vpn_detected: bool,
    /// Clamped sum of the weights of detected signals
    pub vpn_confidence: f64,
    /// Per-signal verdict; unavailable probes count as not detected
    pub signals: BTreeMap<Signal, bool>,
    /// Probes that failed, timed out or are unsupported here, with the reason
    pub unavailable: BTreeMap<Signal, String>,
    pub details: HealthDetails,
}

impl HealthStatus {
    /// Status of a host where nothing was checked.
    pub fn unchecked() -> Self {
        Self {
            internet_online: true,
            vpn_detected: false,
            vpn_confidence: 0.0,
            signals: Signal::ALL.iter().map(|s| (*s, false)).collect(),
            unavailable: BTreeMap::new(),
            details: HealthDetails::default(),
        }
    }

    /// Reason the tunnel must not start under `config`, if any.
    ///
    /// Connectivity is reported before VPN presence.
    pub fn blocking_reason(&self, config: &HealthCheckConfig) -> Option<BlockReason> {
        if config.internet && !self.internet_online {
            return Some(BlockReason::Offline);
        }
        if config.vpn && self.vpn_detected {
            return Some(BlockReason::VpnDetected {
                confidence: self.vpn_confidence,
            });
        }
        None
    }

    /// Names of the signals that fired.
    pub fn detected_signals(&self) -> Vec<Signal> {
        self.signals
            .iter()
            .filter(|(_, hit)| **hit)
            .map(|(s, _)| *s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_reported_before_vpn() {
        let status = HealthStatus {
            internet_online: false,
            vpn_detected: true,
            vpn_confidence: 0.6,
            ..HealthStatus::unchecked()
        };
        let config = HealthCheckConfig::default();
        assert_eq!(status.blocking_reason(&config), Some(BlockReason::Offline));
    }

    #[test]
    fn test_disabled_checks_never_block() {
        let status = HealthStatus {
            internet_online: false,
            vpn_detected: true,
            vpn_confidence: 0.6,
            ..HealthStatus::unchecked()
        };
        assert_eq!(
            status.blocking_reason(&HealthCheckConfig::disabled()),
            None
        );
    }

    #[test]
    fn test_vpn_blocks_when_enabled() {
        let status = HealthStatus {
            vpn_detected: true,
            vpn_confidence: 0.25,
            ..HealthStatus::unchecked()
        };
        let config = HealthCheckConfig {
            internet: false,
            ..HealthCheckConfig::default()
        };
        assert!(matches!(
            status.blocking_reason(&config),
            Some(BlockReason::VpnDetected { .. })
        ));
    }

    #[test]
    fn test_serializes_signal_keys_by_name() {
        let mut status = HealthStatus::unchecked();
        status.signals.insert(Signal::VirtualInterface, true);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["signals"]["virtual_interface"], true);
        assert_eq!(status.detected_signals(), vec![Signal::VirtualInterface]);
    }
}
