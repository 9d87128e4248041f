//! Health gate: reachability plus weighted VPN signals

use crate::probes::{system_probes, Platform, ProbeContext, ProbeError, SignalProbe};
use crate::reachability::{all_reachable, Reachability, TcpReachability};
use crate::signal::{confidence, vpn_detected, Signal};
use crate::status::HealthStatus;
use futures::future::join_all;
use futures::FutureExt;
use quickflare_common::HealthCheckConfig;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info};

/// Pre-flight check deciding whether a tunnel may start.
#[derive(Clone)]
pub struct HealthGate {
    probes: Vec<Arc<dyn SignalProbe>>,
    reachability: Arc<dyn Reachability>,
    platform: Platform,
}

impl std::fmt::Debug for HealthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthGate")
            .field(
                "probes",
                &self.probes.iter().map(|p| p.signal()).collect::<Vec<_>>(),
            )
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl Default for HealthGate {
    fn default() -> Self {
        Self::system()
    }
}

impl HealthGate {
    /// Gate probing the real host.
    pub fn system() -> Self {
        Self::new(system_probes(), Arc::new(TcpReachability))
    }

    pub fn new(probes: Vec<Arc<dyn SignalProbe>>, reachability: Arc<dyn Reachability>) -> Self {
        Self {
            probes,
            reachability,
            platform: Platform::current(),
        }
    }

    /// Parse command output as if running on `platform`.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Evaluate with default timeouts and targets.
    pub async fn evaluate(&self) -> HealthStatus {
        self.evaluate_with(&HealthCheckConfig::default()).await
    }

    /// Run the reachability check and every signal probe concurrently.
    ///
    /// Never fails: probes that error, time out or panic count as not detected
    /// and are listed in [`HealthStatus::unavailable`]. A disabled check is
    /// skipped and reported as passing.
    pub async fn evaluate_with(&self, config: &HealthCheckConfig) -> HealthStatus {
        let ctx = ProbeContext::new(self.platform, config.probe_timeout);

        let internet = async {
            if config.internet {
                self.check_internet(config).await
            } else {
                true
            }
        };
        let probes = async {
            if config.vpn {
                join_all(
                    self.probes
                        .iter()
                        .map(|probe| self.run_probe(probe.as_ref(), &ctx, config)),
                )
                .await
            } else {
                Vec::new()
            }
        };
        let (internet_online, results) = tokio::join!(internet, probes);

        let mut signals: BTreeMap<Signal, bool> = Signal::ALL.iter().map(|s| (*s, false)).collect();
        let mut unavailable = BTreeMap::new();
        for (signal, result) in results {
            match result {
                Ok(hit) => {
                    signals.insert(signal, hit);
                }
                Err(e) => {
                    debug!("Probe {} unavailable: {}", signal, e);
                    unavailable.insert(signal, e.to_string());
                }
            }
        }

        let vpn_confidence = confidence(&signals);
        let vpn = vpn_detected(&signals, vpn_confidence);
        let status = HealthStatus {
            internet_online,
            vpn_detected: vpn,
            vpn_confidence,
            signals,
            unavailable,
            details: ctx.take_details(),
        };

        info!(
            online = status.internet_online,
            vpn = status.vpn_detected,
            confidence = status.vpn_confidence,
            "Health check complete"
        );
        if status.vpn_detected {
            let fired: Vec<&str> = status.detected_signals().iter().map(|s| s.name()).collect();
            debug!("VPN signals: {}", fired.join(", "));
        }
        status
    }

    /// Whether every configured reachability target answers.
    pub async fn check_internet(&self, config: &HealthCheckConfig) -> bool {
        all_reachable(
            self.reachability.as_ref(),
            &config.reachability_targets,
            config.reachability_timeout,
        )
        .await
    }

    async fn run_probe(
        &self,
        probe: &dyn SignalProbe,
        ctx: &ProbeContext,
        config: &HealthCheckConfig,
    ) -> (Signal, Result<bool, ProbeError>) {
        let signal = probe.signal();
        let guarded = AssertUnwindSafe(probe.detect(ctx)).catch_unwind();
        let result = match tokio::time::timeout(config.probe_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(ProbeError::Panicked),
            Err(_) => Err(ProbeError::Timeout(config.probe_timeout)),
        };
        (signal, result)
    }
}
