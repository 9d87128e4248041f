//! Defaults shared by the library, the CLI and the tests.
//!
//! Use these constants instead of magic numbers so defaults stay consistent
//! across crates.

use std::time::Duration;

/// Default local port the tunnel forwards to.
pub const DEFAULT_LOCAL_PORT: u16 = 5000;

/// How long `start()` waits for the public URL to show up.
pub const DEFAULT_URL_WAIT: Duration = Duration::from_secs(60);

/// Domain suffix of quick-tunnel URLs.
pub const DEFAULT_URL_SUFFIX: &str = "trycloudflare.com";

/// File the last captured URL is persisted to (CLI default).
pub const DEFAULT_URL_FILE: &str = ".cf";

/// Grace period between the termination request and a forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Poll interval of the module output reader.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-probe timeout for environment signal probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for each internet reachability target.
pub const DEFAULT_REACHABILITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Public resolvers that must all accept a TCP connection for the host to count as online.
pub const REACHABILITY_TARGETS: [&str; 3] = ["8.8.8.8:53", "1.1.1.1:53", "9.9.9.9:53"];

/// Program name passed as the first word of the module's run string.
pub const DEFAULT_MODULE_ARGV0: &str = "cloudflared";
