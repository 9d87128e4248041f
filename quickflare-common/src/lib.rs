//! Common utilities and types for `quickflare`

pub mod config;
pub mod constants;
pub mod error;

pub use config::{HealthCheckConfig, ModuleSymbols, SupervisorConfig};
pub use constants::{
    DEFAULT_GRACE_PERIOD, DEFAULT_LOCAL_PORT, DEFAULT_MODULE_ARGV0, DEFAULT_POLL_INTERVAL,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_REACHABILITY_TIMEOUT, DEFAULT_URL_FILE, DEFAULT_URL_SUFFIX,
    DEFAULT_URL_WAIT, REACHABILITY_TARGETS,
};
pub use error::{BlockReason, Result, TunnelError};
