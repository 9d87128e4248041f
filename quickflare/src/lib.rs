//! # `quickflare`
//!
//! Supervisor for ephemeral public tunnels driven by an external tunnel binary.
//!
//! ## Overview
//!
//! The tunnel component has no API for reporting its public URL; it only
//! prints it. `quickflare` runs the component (as a child process or as a
//! loaded module), scrapes the URL from its output and manages the session
//! lifecycle around it, refusing to start when the host is offline or routed
//! through a VPN.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quickflare::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let runner = Runner::builder().port(5000).url_file(".cf").build()?;
//! match runner.start().await? {
//!     Some(url) => println!("Tunnel up at {url}"),
//!     None => println!("Tunnel running, URL not seen yet"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`quickflare-common`] - Errors, configuration and defaults
//! - [`quickflare-health`] - Reachability and VPN signal probes
//! - [`quickflare-core`] - Backends and URL capture
//! - this crate - the [`Runner`] lifecycle controller

pub mod config;
pub mod resolver;
pub mod runner;
pub mod session;
pub mod store;

// Re-export subcrates
pub use quickflare_common as common;
pub use quickflare_core as tunnel;
pub use quickflare_health as health;

pub use config::RunnerConfig;
pub use resolver::{
    platform_key, BinaryResolver, DownloadProgress, FixedPath, ProgressCallback, SearchPaths,
};
pub use runner::{Runner, RunnerBuilder, UrlCallback};
pub use session::{SessionState, TunnelStatus};
pub use store::UrlStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::common::{BlockReason, HealthCheckConfig, Result, TunnelError};
    pub use crate::tunnel::{BackendHint, BackendKind};
    pub use crate::health::{HealthGate, HealthStatus, Signal};
    pub use crate::{Runner, RunnerBuilder, RunnerConfig, SessionState, TunnelStatus};
}

// Convenience re-exports at crate root
pub use common::{BlockReason, Result, TunnelError};
