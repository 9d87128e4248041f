//! Error types for `quickflare`

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why the health gate refused to let a tunnel start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockReason {
    /// At least one reachability probe failed
    Offline,
    /// A competing VPN was detected
    VpnDetected {
        /// Weighted confidence at the time of the decision
        confidence: f64,
    },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Offline => f.write_str("internet unreachable"),
            BlockReason::VpnDetected { confidence } => {
                write!(f, "VPN detected (confidence {confidence:.2})")
            }
        }
    }
}

/// Main error type for `quickflare` operations
#[derive(Error, Debug)]
pub enum TunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tunnel binary or module does not exist
    #[error("Tunnel binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// The module could not be loaded or lacks an entry point
    #[error("Failed to load tunnel module: {0}")]
    LoadFailure(String),

    /// A session is already active on this runner
    #[error("A tunnel session is already active")]
    AlreadyRunning,

    /// Health gate refused to start a tunnel
    #[error("Health gate blocked tunnel start: {0}")]
    HealthGateBlocked(BlockReason),

    /// The backend died before producing any usable output
    #[error("Tunnel process exited before producing a URL (exit code: {code:?})")]
    ProcessExitedEarly { code: Option<i32> },

    /// The backend did not stop within its grace period
    #[error("Tunnel did not shut down within {0:?}")]
    ShutdownTimeout(Duration),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    /// Whether the error came from the health gate rather than the tunnel itself.
    pub fn is_blocked(&self) -> bool {
        matches!(self, TunnelError::HealthGateBlocked(_))
    }
}
