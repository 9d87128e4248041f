//! Configuration for the tunnel [`Runner`](crate::Runner).

use quickflare_common::{
    HealthCheckConfig, Result, SupervisorConfig, TunnelError, DEFAULT_LOCAL_PORT,
    DEFAULT_URL_WAIT,
};
use quickflare_core::BackendHint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a tunnel runner.
///
/// Use [`RunnerBuilder`](crate::RunnerBuilder) for ergonomic construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Local port the tunnel forwards to
    pub port: u16,

    /// How long `start()` waits for the public URL
    pub url_wait_timeout: Duration,

    /// Pre-flight checks run before every start
    pub health_checks: HealthCheckConfig,

    /// Backend and shutdown settings
    pub supervisor: SupervisorConfig,

    /// Backend preference; `Auto` decides from the artifact
    pub backend: BackendHint,

    /// File the captured URL is persisted to, if any
    pub url_file: Option<PathBuf>,
}

impl RunnerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TunnelError::Config("port must be non-zero".into()));
        }
        if self.url_wait_timeout.is_zero() {
            return Err(TunnelError::Config(
                "url_wait_timeout must be greater than zero".into(),
            ));
        }
        if self.health_checks.internet && self.health_checks.reachability_targets.is_empty() {
            return Err(TunnelError::Config(
                "internet check enabled without reachability targets".into(),
            ));
        }
        self.supervisor.validate()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_LOCAL_PORT,
            url_wait_timeout: DEFAULT_URL_WAIT,
            health_checks: HealthCheckConfig::default(),
            supervisor: SupervisorConfig::default(),
            backend: BackendHint::Auto,
            url_file: None,
        }
    }
}
