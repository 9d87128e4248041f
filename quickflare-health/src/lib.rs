//! Pre-flight health gate for `quickflare`
//!
//! Decides whether a tunnel may start: the host must reach every configured
//! target and must not show signs of a competing VPN.
//!
//! ```no_run
//! use quickflare_health::HealthGate;
//!
//! # async fn demo() {
//! let status = HealthGate::system().evaluate().await;
//! if status.vpn_detected {
//!     println!("VPN detected ({:.2})", status.vpn_confidence);
//! }
//! # }
//! ```

pub mod gate;
pub mod probes;
pub mod reachability;
pub mod signal;
pub mod status;

pub use gate::HealthGate;
pub use probes::{FixedProbe, Platform, ProbeContext, ProbeError, ProbeResult, SignalProbe};
pub use reachability::{FixedReachability, Reachability, TcpReachability};
pub use signal::{Signal, VPN_CONFIDENCE_THRESHOLD};
pub use status::{HealthDetails, HealthStatus};
