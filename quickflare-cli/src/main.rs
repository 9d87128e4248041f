//! quickflare command line
//!
//! Exposes a local port through an ephemeral public tunnel.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "quickflare",
    author,
    version,
    about = "Expose a local port through an ephemeral public tunnel",
    long_about = "quickflare supervises the cloudflared tunnel binary (or its loadable module),\n\
                  refuses to start while the host is offline or behind a VPN, and reports\n\
                  the public URL the tunnel was assigned.",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a tunnel and keep it up until Ctrl+C
    Run(commands::run::RunArgs),

    /// Run the health gate and print the report
    Check(commands::check::CheckArgs),

    /// Health gate, tunnel start and a request through the tunnel
    Verify(commands::verify::VerifyArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::Check(args) => commands::check::run(args).await,
        Commands::Verify(args) => commands::verify::run(args).await,
        Commands::Version => {
            commands::version::run();
            Ok(ExitCode::SUCCESS)
        }
    }
}
