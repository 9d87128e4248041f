//! Session state reported by the runner

use quickflare_core::BackendKind;
use quickflare_health::HealthStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a runner's session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Whether a new `start()` may begin from this state.
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Stopped | SessionState::Failed
        )
    }

    pub fn is_active(self) -> bool {
        !self.can_start()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot returned by [`Runner::status`](crate::Runner::status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelStatus {
    pub state: SessionState,

    /// URL captured in the current session
    pub url: Option<String>,

    /// URL read back from the store when the session has none
    pub last_known_url: Option<String>,

    /// Liveness of the backend; false when no session is running
    pub alive: bool,

    pub session_id: Option<Uuid>,
    pub backend: Option<BackendKind>,
    pub version: Option<String>,

    /// Last recorded failure: start error, backend fault or early exit
    pub error: Option<String>,

    /// Most recent health gate result
    pub health: Option<HealthStatus>,
}
