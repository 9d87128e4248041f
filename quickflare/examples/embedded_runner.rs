//! Example: Embedded `quickflare` Runner
//!
//! This example shows how to expose a local service through a quick tunnel
//! from your own application.
//!
//! # Usage
//!
//! ```bash
//! # Start a local HTTP server on port 8000 (e.g., with Python)
//! python3 -m http.server 8000
//!
//! # Run this example
//! cargo run --example embedded_runner -- \
//!     --port 8000 \
//!     --binary binaries/cloudflared
//! ```

use quickflare::prelude::*;
use std::env;

#[tokio::main]
async fn main() -> quickflare::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info,quickflare=debug")
        .init();

    // Parse command line arguments (simple parsing for example)
    let args: Vec<String> = env::args().collect();

    let port = get_arg(&args, "--port")
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    println!("`quickflare` Embedded Runner Example");
    println!("====================================");
    println!("Local port: {port}");
    println!();

    let mut builder = Runner::builder()
        .port(port)
        .url_file(".cf")
        .on_url_found(|url| println!("Public URL: {url}"));
    if let Some(binary) = get_arg(&args, "--binary") {
        builder = builder.binary(binary);
    }
    let runner = builder.build()?;

    match runner.start().await {
        Ok(Some(_)) => {}
        Ok(None) => println!("Tunnel is up but its URL has not been printed yet"),
        Err(TunnelError::HealthGateBlocked(reason)) => {
            println!("Refusing to start: {reason}");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    println!("Press Ctrl+C to stop...");
    let _ = tokio::signal::ctrl_c().await;

    let status = runner.status().await;
    println!("Final state: {} (url: {:?})", status.state, status.url);
    match runner.stop().await {
        Ok(()) => println!("Tunnel stopped"),
        Err(e) => println!("Tunnel stopped with error: {e}"),
    }
    Ok(())
}

fn get_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
