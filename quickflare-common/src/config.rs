//! Configuration types shared across `quickflare` crates

use crate::constants::{
    DEFAULT_GRACE_PERIOD, DEFAULT_MODULE_ARGV0, DEFAULT_POLL_INTERVAL, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_REACHABILITY_TIMEOUT, DEFAULT_URL_SUFFIX, REACHABILITY_TARGETS,
};
use crate::error::{Result, TunnelError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Health gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Require every reachability target to answer before starting
    pub internet: bool,
    /// Refuse to start while a competing VPN is detected
    pub vpn: bool,
    /// Timeout applied to each signal probe individually
    pub probe_timeout: Duration,
    /// Targets that must all accept a TCP connection
    pub reachability_targets: Vec<SocketAddr>,
    /// Connect timeout per reachability target
    pub reachability_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            internet: true,
            vpn: true,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            reachability_targets: REACHABILITY_TARGETS
                .iter()
                .filter_map(|t| t.parse().ok())
                .collect(),
            reachability_timeout: DEFAULT_REACHABILITY_TIMEOUT,
        }
    }
}

impl HealthCheckConfig {
    /// Configuration with both checks switched off.
    pub fn disabled() -> Self {
        Self {
            internet: false,
            vpn: false,
            ..Self::default()
        }
    }
}

/// Exported entry points of the loadable tunnel module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSymbols {
    /// `int Init(void)`; 0 = initialized, 1 = already initialized
    pub init: String,
    /// `int Run(const char *args)`, blocking until `Stop`
    pub run: String,
    /// `int Stop(void)`
    pub stop: String,
    /// `const char *Version(void)`
    pub version: String,
}

impl Default for ModuleSymbols {
    fn default() -> Self {
        Self {
            init: "CloudflaredInit".to_string(),
            run: "CloudflaredRunSync".to_string(),
            stop: "CloudflaredStop".to_string(),
            version: "CloudflaredVersion".to_string(),
        }
    }
}

/// Tunnel supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Time between a termination request and a forced kill
    pub grace_period: Duration,
    /// Poll interval of the module output reader
    pub poll_interval: Duration,
    /// Domain suffix the captured URL must end with
    pub url_suffix: String,
    /// Entry point names of the loadable module
    pub module_symbols: ModuleSymbols,
    /// First word of the module run string
    pub module_argv0: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            url_suffix: DEFAULT_URL_SUFFIX.to_string(),
            module_symbols: ModuleSymbols::default(),
            module_argv0: DEFAULT_MODULE_ARGV0.to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.url_suffix.trim_matches('.').is_empty() {
            return Err(TunnelError::Config("url_suffix is required".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(TunnelError::Config(
                "poll_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
