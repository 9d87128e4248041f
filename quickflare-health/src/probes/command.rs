//! Bounded execution of diagnostic commands

use super::ProbeError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured result of a diagnostic command.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub stdout: String,
}

/// Run `program` with `args`, killing it if it outlives `limit`.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    limit: Duration,
) -> Result<CommandOutput, ProbeError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let output = tokio::time::timeout(limit, cmd.output())
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|source| ProbeError::Command {
            program: program.to_string(),
            source,
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}
