//! Spawned-process backend

use super::artifact::tunnel_args;
use super::{BackendKind, StopOutcome, TunnelBackend};
use crate::capture::{spawn_line_reader, UrlPattern, UrlSlot};
use async_trait::async_trait;
use quickflare_common::{Result, TunnelError};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a stopped process's reader gets to reach EOF.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

fn tunnel_command(binary: &Path) -> Command {
    let mut cmd = Command::new(binary);
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

/// `<binary> --version`, first non-empty output line.
pub(crate) async fn query_version(binary: &Path) -> Option<String> {
    let mut cmd = tunnel_command(binary);
    cmd.arg("--version")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let output = tokio::time::timeout(VERSION_QUERY_TIMEOUT, cmd.output())
        .await
        .ok()?
        .ok()?;
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    String::from_utf8_lossy(&text)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

/// Ask the child to exit. Unix gets SIGTERM; Windows has no console to signal,
/// so the process is terminated directly.
#[allow(unsafe_code)]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let Some(pid) = child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid).map_err(std::io::Error::other)?;
        // SAFETY: kill(2) has no memory-safety preconditions; pid belongs to a
        // child we have not reaped yet.
        if unsafe { libc::kill(pid, libc::SIGTERM) } == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        child.start_kill()
    }
}

/// Tunnel component running as a child process.
pub struct ProcessBackend {
    child: Child,
    reader: Option<JoinHandle<()>>,
    exit: Option<ExitStatus>,
    version: Option<String>,
}

impl ProcessBackend {
    /// Spawn `<binary> tunnel --url http://localhost:<port> --protocol http2`.
    ///
    /// stderr feeds the line reader; stdout is discarded.
    pub async fn spawn(
        binary: &Path,
        port: u16,
        pattern: UrlPattern,
        slot: UrlSlot,
    ) -> Result<Self> {
        let version = query_version(binary).await;

        let mut cmd = tunnel_command(binary);
        cmd.args(tunnel_args(port))
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TunnelError::BinaryNotFound(binary.to_path_buf()),
            _ => TunnelError::Io(e),
        })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TunnelError::InvalidState("stderr was not captured".into()))?;
        let reader = spawn_line_reader(stderr, pattern, slot);

        info!(
            pid = child.id().unwrap_or_default(),
            "Spawned {}",
            binary.display()
        );
        Ok(Self {
            child,
            reader: Some(reader),
            exit: None,
            version,
        })
    }

    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.exit = status,
                Err(e) => debug!("try_wait failed: {}", e),
            }
        }
        self.exit
    }

    async fn finish_reader(&mut self) {
        let Some(mut reader) = self.reader.take() else {
            return;
        };
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            reader.abort();
        }
    }
}

#[async_trait]
impl TunnelBackend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SpawnedProcess
    }

    fn is_alive(&mut self) -> bool {
        self.poll_exit().is_none()
    }

    fn exit_code(&mut self) -> Option<i32> {
        self.poll_exit().and_then(|status| status.code())
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    async fn stop(&mut self, grace: Duration) -> Result<StopOutcome> {
        if self.poll_exit().is_some() {
            self.finish_reader().await;
            return Ok(StopOutcome::AlreadyExited);
        }

        if let Err(e) = request_termination(&mut self.child) {
            debug!("Termination request failed: {}", e);
        }

        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                self.exit = Some(status?);
                StopOutcome::Graceful
            }
            Err(_) => {
                warn!("Tunnel process ignored termination for {:?}, killing", grace);
                self.child.kill().await?;
                self.exit = self.child.try_wait().ok().flatten();
                StopOutcome::Forced
            }
        };
        self.finish_reader().await;
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::capture::url_slot;
    use crate::test_support::script;

    #[tokio::test]
    async fn test_version_query() {
        let path = script("version");
        assert_eq!(
            query_version(&path).await.as_deref(),
            Some("cloudflared version 2024.6.1")
        );
    }

    #[tokio::test]
    async fn test_spawn_passes_tunnel_args() {
        let path = script("args");
        let (slot, watch) = url_slot();
        let mut backend = ProcessBackend::spawn(
            &path,
            5000,
            UrlPattern::quick_tunnel().unwrap(),
            slot,
        )
        .await
        .unwrap();

        assert_eq!(
            watch.await_url(Duration::from_secs(5)).await.as_deref(),
            Some("https://args-http2.trycloudflare.com")
        );
        assert!(backend.is_alive());
        let outcome = backend.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, StopOutcome::Graceful);
        assert!(!backend.is_alive());
    }

    #[tokio::test]
    async fn test_ignored_sigterm_is_forced() {
        let path = script("stubborn");
        let (slot, _watch) = url_slot();
        let mut backend = ProcessBackend::spawn(
            &path,
            5000,
            UrlPattern::quick_tunnel().unwrap(),
            slot,
        )
        .await
        .unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = backend.stop(Duration::from_millis(300)).await.unwrap();
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(!backend.is_alive());
    }

    #[tokio::test]
    async fn test_exit_code_of_dead_process() {
        let path = script("dies");
        let (slot, watch) = url_slot();
        let mut backend = ProcessBackend::spawn(
            &path,
            5000,
            UrlPattern::quick_tunnel().unwrap(),
            slot,
        )
        .await
        .unwrap();

        assert_eq!(
            watch.wait(Duration::from_secs(5)).await,
            crate::capture::UrlOutcome::StreamClosed
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!backend.is_alive());
        assert_eq!(backend.exit_code(), Some(3));
        assert_eq!(
            backend.stop(Duration::from_secs(1)).await.unwrap(),
            StopOutcome::AlreadyExited
        );
    }
}
