//! Tunnel process supervisor
//!
//! A [`Supervisor`] turns a resolved artifact into a running [`TunnelHandle`].
//! The handle owns exactly one [`TunnelBackend`]: a spawned child process or
//! a module loaded into this process. Callers never see which one beyond
//! [`TunnelHandle::kind`].

mod artifact;
#[cfg(any(unix, windows))]
mod module;
mod process;
#[cfg(any(unix, windows))]
mod stdio;

pub use artifact::{
    is_module_artifact, module_extension, module_run_string, select_backend, tunnel_args,
    BackendHint, BackendKind,
};
#[cfg(any(unix, windows))]
pub use module::ModuleBackend;
pub use process::ProcessBackend;

use crate::capture::{url_slot, UrlOutcome, UrlPattern, UrlWatch};
use async_trait::async_trait;
use quickflare_common::{Result, SupervisorConfig, TunnelError};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// How a backend ended up stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period
    Graceful,
    /// Killed after the grace period
    Forced,
    /// Was already gone when stop was requested
    AlreadyExited,
}

/// One live instance of the tunnel component.
#[async_trait]
pub trait TunnelBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the component is still running. May reap an exited child.
    fn is_alive(&mut self) -> bool;

    /// Exit code once the component has exited, when the backend has one.
    fn exit_code(&mut self) -> Option<i32> {
        None
    }

    fn version(&self) -> Option<String>;

    /// Fault recorded by a background unit, if any.
    fn fault(&self) -> Option<String> {
        None
    }

    /// Stop the component, waiting at most `grace` before escalating.
    async fn stop(&mut self, grace: Duration) -> Result<StopOutcome>;
}

/// A started tunnel session.
pub struct TunnelHandle {
    id: Uuid,
    backend: Box<dyn TunnelBackend>,
    url: UrlWatch,
    started_at: Instant,
}

impl std::fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("id", &self.id)
            .field("kind", &self.backend.kind())
            .field("url", &self.url.current())
            .finish_non_exhaustive()
    }
}

impl TunnelHandle {
    pub fn new(backend: Box<dyn TunnelBackend>, url: UrlWatch) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            url,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn is_alive(&mut self) -> bool {
        self.backend.is_alive()
    }

    pub fn exit_code(&mut self) -> Option<i32> {
        self.backend.exit_code()
    }

    pub fn version(&self) -> Option<String> {
        self.backend.version()
    }

    pub fn fault(&self) -> Option<String> {
        self.backend.fault()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The captured URL, if any, without waiting.
    pub fn url(&self) -> Option<String> {
        self.url.current()
    }

    pub fn url_watch(&self) -> UrlWatch {
        self.url.clone()
    }

    /// Wait up to `timeout` for the URL. The backend keeps running either way.
    pub async fn wait_url(&self, timeout: Duration) -> UrlOutcome {
        self.url.wait(timeout).await
    }

    pub async fn await_url(&self, timeout: Duration) -> Option<String> {
        self.url.await_url(timeout).await
    }

    /// Stop the backend and consume the handle.
    pub async fn stop(mut self, grace: Duration) -> Result<StopOutcome> {
        let outcome = self.backend.stop(grace).await;
        match &outcome {
            Ok(outcome) => info!(session = %self.id, ?outcome, "Tunnel stopped"),
            Err(e) => debug!(session = %self.id, "Tunnel stop failed: {}", e),
        }
        outcome
    }
}

/// Starts tunnel backends from resolved artifacts.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    pattern: UrlPattern,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        config.validate()?;
        let pattern = UrlPattern::new(&config.url_suffix)?;
        Ok(Self { config, pattern })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    /// Start the component at `binary`, forwarding to `localhost:<port>`.
    ///
    /// Nothing is left behind on failure. The returned handle is running but
    /// may not have produced its URL yet.
    pub async fn start(&self, binary: &Path, port: u16, hint: BackendHint) -> Result<TunnelHandle> {
        if !binary.exists() {
            return Err(TunnelError::BinaryNotFound(binary.to_path_buf()));
        }

        let kind = select_backend(binary, hint);
        let (slot, watch) = url_slot();
        let backend: Box<dyn TunnelBackend> = match kind {
            BackendKind::SpawnedProcess => Box::new(
                ProcessBackend::spawn(binary, port, self.pattern.clone(), slot).await?,
            ),
            BackendKind::LoadedModule => self.load_module(binary, port, slot).await?,
        };

        let handle = TunnelHandle::new(backend, watch);
        info!(
            session = %handle.id(),
            backend = %kind,
            port,
            version = handle.version().as_deref().unwrap_or("unknown"),
            "Tunnel started"
        );
        Ok(handle)
    }

    #[cfg(any(unix, windows))]
    async fn load_module(
        &self,
        binary: &Path,
        port: u16,
        slot: crate::capture::UrlSlot,
    ) -> Result<Box<dyn TunnelBackend>> {
        let path = binary.to_path_buf();
        let pattern = self.pattern.clone();
        let config = self.config.clone();
        // Loading runs library initialisers; keep them off the runtime threads
        let backend = tokio::task::spawn_blocking(move || {
            ModuleBackend::load(&path, port, pattern, slot, &config)
        })
        .await
        .map_err(|e| TunnelError::LoadFailure(format!("module loader panicked: {e}")))??;
        Ok(Box::new(backend))
    }

    #[cfg(not(any(unix, windows)))]
    async fn load_module(
        &self,
        _binary: &Path,
        _port: u16,
        _slot: crate::capture::UrlSlot,
    ) -> Result<Box<dyn TunnelBackend>> {
        Err(TunnelError::LoadFailure(
            "loadable modules are not supported on this platform".into(),
        ))
    }
}
