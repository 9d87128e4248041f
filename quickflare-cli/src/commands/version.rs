//! Version subcommand implementation

use quickflare::platform_key;

pub fn run() {
    println!("quickflare {}", env!("CARGO_PKG_VERSION"));
    println!("platform: {}", platform_key());

    #[cfg(target_os = "linux")]
    println!("target: linux");
    #[cfg(target_os = "macos")]
    println!("target: macos");
    #[cfg(target_os = "windows")]
    println!("target: windows");
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    println!("target: unknown");
}
