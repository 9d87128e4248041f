//! Embeddable tunnel runner with builder pattern.
//!
//! # Example
//!
//! ```rust,no_run
//! use quickflare::Runner;
//!
//! # async fn example() -> quickflare::Result<()> {
//! let runner = Runner::builder()
//!     .port(8080)
//!     .binary("binaries/cloudflared")
//!     .on_url_found(|url| println!("Tunnel ready at {url}"))
//!     .build()?;
//!
//! if let Some(url) = runner.start().await? {
//!     println!("Public URL: {url}");
//! }
//! runner.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RunnerConfig;
use crate::resolver::{BinaryResolver, FixedPath, ProgressCallback, SearchPaths};
use crate::session::{SessionState, TunnelStatus};
use crate::store::UrlStore;
use crate::DownloadProgress;
use quickflare_common::{HealthCheckConfig, Result, SupervisorConfig, TunnelError};
use quickflare_core::{BackendHint, Supervisor, TunnelHandle, UrlOutcome};
use quickflare_health::{HealthGate, HealthStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Called with the public URL, at most once per session.
pub type UrlCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How long a closed output stream may precede the backend's exit.
const EXIT_SETTLE: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(50);

struct Session {
    handle: TunnelHandle,
    url: Option<String>,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    /// Bumped by every accepted `start()`; a start whose epoch is stale was cancelled
    epoch: u64,
    session: Option<Session>,
    health: Option<HealthStatus>,
    error: Option<String>,
}

/// Runs one tunnel session at a time: health gate, backend start, URL capture.
///
/// Use [`Runner::builder()`] to construct one. All methods take `&self`, so a
/// runner can be shared behind an `Arc`; concurrent `start()` calls are
/// rejected with [`TunnelError::AlreadyRunning`].
pub struct Runner {
    config: RunnerConfig,
    gate: HealthGate,
    supervisor: Supervisor,
    resolver: Arc<dyn BinaryResolver>,
    store: Option<UrlStore>,
    on_url_found: Option<UrlCallback>,
    on_download_progress: Option<ProgressCallback>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Runner`] with ergonomic configuration.
#[derive(Default)]
pub struct RunnerBuilder {
    config: RunnerConfig,
    resolver: Option<Arc<dyn BinaryResolver>>,
    gate: Option<HealthGate>,
    on_url_found: Option<UrlCallback>,
    on_download_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for RunnerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerBuilder")
            .field("config", &self.config)
            .field("custom_resolver", &self.resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::default()
    }

    /// Start a tunnel session.
    ///
    /// Resolves the artifact, runs the health gate, starts the backend and
    /// waits up to `url_wait_timeout` for its URL. Returns `Ok(None)` when no
    /// URL showed up in time; the session then stays running and a late URL
    /// is still picked up by [`status()`](Self::status).
    ///
    /// # Errors
    ///
    /// - [`TunnelError::AlreadyRunning`] while another session is active
    /// - [`TunnelError::HealthGateBlocked`] when the host is offline or on a VPN;
    ///   no backend is started in that case
    /// - [`TunnelError::BinaryNotFound`] / [`TunnelError::LoadFailure`]
    /// - [`TunnelError::ProcessExitedEarly`] when the backend dies without a URL
    pub async fn start(&self) -> Result<Option<String>> {
        let epoch = {
            let mut inner = self.inner.lock().await;
            if inner.state.is_active() {
                return Err(TunnelError::AlreadyRunning);
            }
            inner.state = SessionState::Starting;
            inner.error = None;
            inner.epoch += 1;
            inner.epoch
        };

        let result = self.launch(epoch).await;
        if let Err(e) = &result {
            let mut inner = self.inner.lock().await;
            if inner.epoch == epoch && inner.state == SessionState::Starting {
                inner.state = SessionState::Failed;
                inner.error = Some(e.to_string());
            }
            warn!("Tunnel start failed: {}", e);
        }
        result
    }

    async fn launch(&self, epoch: u64) -> Result<Option<String>> {
        let binary = self
            .resolver
            .resolve(self.on_download_progress.as_ref())
            .await?;

        let checks = &self.config.health_checks;
        if checks.internet || checks.vpn {
            let health = self.gate.evaluate_with(checks).await;
            let blocked = health.blocking_reason(checks);
            #[cfg(feature = "metrics")]
            if let Some(m) = quickflare_observability::tunnel_metrics() {
                m.record_health(blocked.is_none());
            }
            self.inner.lock().await.health = Some(health);
            if let Some(reason) = blocked {
                return Err(TunnelError::HealthGateBlocked(reason));
            }
        }

        let handle = self
            .supervisor
            .start(&binary, self.config.port, self.config.backend)
            .await?;
        let session_id = handle.id();
        let kind = handle.kind();
        let watch = handle.url_watch();

        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch || inner.state != SessionState::Starting {
                drop(inner);
                debug!(session = %session_id, "Start was cancelled, stopping new tunnel");
                let _ = handle.stop(self.config.supervisor.grace_period).await;
                return Err(TunnelError::InvalidState(
                    "start was cancelled by stop()".into(),
                ));
            }
            inner.state = SessionState::Running;
            inner.session = Some(Session { handle, url: None });
        }
        #[cfg(feature = "metrics")]
        if let Some(m) = quickflare_observability::tunnel_metrics() {
            m.session_started(&kind.to_string());
        }

        let waited = std::time::Instant::now();
        match watch.wait(self.config.url_wait_timeout).await {
            UrlOutcome::Captured(url) => {
                #[cfg(feature = "metrics")]
                if let Some(m) = quickflare_observability::tunnel_metrics() {
                    m.observe_url_capture(waited.elapsed());
                }
                debug!(session = %session_id, "URL captured after {:?}", waited.elapsed());
                Ok(self.record_url(session_id, url).await)
            }
            UrlOutcome::TimedOut => {
                warn!(
                    session = %session_id,
                    backend = %kind,
                    "No tunnel URL within {:?}; tunnel left running",
                    self.config.url_wait_timeout
                );
                Ok(None)
            }
            UrlOutcome::StreamClosed => self.check_early_exit(session_id).await,
        }
    }

    /// The output stream ended without a URL: fail the session if the backend died.
    async fn check_early_exit(&self, session_id: Uuid) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + EXIT_SETTLE;
        loop {
            let mut inner = self.inner.lock().await;
            let Some(session) = inner
                .session
                .as_mut()
                .filter(|s| s.handle.id() == session_id)
            else {
                // Stopped while we were waiting
                return Ok(None);
            };

            if !session.handle.is_alive() {
                let code = session.handle.exit_code();
                let err = TunnelError::ProcessExitedEarly { code };
                inner.state = SessionState::Failed;
                inner.error = Some(err.to_string());
                let dead = inner.session.take();
                drop(inner);
                if let Some(dead) = dead {
                    self.discard(dead).await;
                }
                return Err(err);
            }
            drop(inner);

            if tokio::time::Instant::now() >= deadline {
                warn!(session = %session_id, "Tunnel output closed without a URL");
                return Ok(None);
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Stop a session that is already gone and release its resources.
    async fn discard(&self, session: Session) {
        #[cfg(feature = "metrics")]
        if let Some(m) = quickflare_observability::tunnel_metrics() {
            m.session_finished(&session.handle.kind().to_string(), "exited");
        }
        if let Err(e) = session
            .handle
            .stop(self.config.supervisor.grace_period)
            .await
        {
            debug!("Cleanup of exited tunnel failed: {}", e);
        }
    }

    /// Store `url` for `session_id` unless the session already has one, then
    /// persist it and fire the callback. Returns the session's URL.
    async fn record_url(&self, session_id: Uuid, url: String) -> Option<String> {
        {
            let mut inner = self.inner.lock().await;
            let session = inner
                .session
                .as_mut()
                .filter(|s| s.handle.id() == session_id)?;
            if let Some(existing) = &session.url {
                return Some(existing.clone());
            }
            session.url = Some(url.clone());
        }
        self.publish_url(&url).await;
        Some(url)
    }

    async fn publish_url(&self, url: &str) {
        info!("Tunnel URL: {}", url);
        if let Some(store) = &self.store {
            if let Err(e) = store.save(url).await {
                warn!("Failed to persist URL to {}: {}", store.path().display(), e);
            }
        }
        if let Some(callback) = &self.on_url_found {
            callback(url);
        }
    }

    /// Stop the active session.
    ///
    /// A no-op when nothing is running. A start still in progress is
    /// cancelled. The session ends up `Stopped` even when the backend had to
    /// be abandoned; that case is reported as [`TunnelError::ShutdownTimeout`].
    pub async fn stop(&self) -> Result<()> {
        let session = {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Starting && inner.session.is_none() {
                inner.state = SessionState::Stopped;
                return Ok(());
            }
            let Some(session) = inner.session.take() else {
                return Ok(());
            };
            inner.state = SessionState::Stopping;
            session
        };

        let kind = session.handle.kind();
        let result = session
            .handle
            .stop(self.config.supervisor.grace_period)
            .await;
        #[cfg(feature = "metrics")]
        if let Some(m) = quickflare_observability::tunnel_metrics() {
            m.session_finished(&kind.to_string(), "stopped");
        }

        let mut inner = self.inner.lock().await;
        inner.state = SessionState::Stopped;
        match result {
            Ok(outcome) => {
                debug!(backend = %kind, ?outcome, "Session stopped");
                Ok(())
            }
            Err(e) => {
                inner.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop, then start again. Returns the result of the start.
    pub async fn restart(&self) -> Result<Option<String>> {
        if let Err(e) = self.stop().await {
            warn!("Stop during restart failed: {}", e);
        }
        self.start().await
    }

    /// Current state, URL and backend liveness.
    ///
    /// A URL that appeared after `start()` stopped waiting is recorded here.
    /// A running session whose backend has died is moved to `Failed`.
    pub async fn status(&self) -> TunnelStatus {
        let mut late_url = None;
        let mut dead = None;

        let mut status = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let mut status = TunnelStatus {
                state: inner.state,
                url: None,
                last_known_url: None,
                alive: false,
                session_id: None,
                backend: None,
                version: None,
                error: inner.error.clone(),
                health: inner.health.clone(),
            };

            if let Some(session) = inner.session.as_mut() {
                if session.url.is_none() {
                    if let Some(url) = session.handle.url() {
                        session.url = Some(url.clone());
                        late_url = Some(url);
                    }
                }
                status.alive = session.handle.is_alive();
                status.url.clone_from(&session.url);
                status.session_id = Some(session.handle.id());
                status.backend = Some(session.handle.kind());
                status.version = session.handle.version();

                if !status.alive && inner.state == SessionState::Running {
                    let reason = match (session.handle.fault(), session.handle.exit_code()) {
                        (Some(fault), _) => fault,
                        (None, Some(code)) => format!("tunnel exited with code {code}"),
                        (None, None) => "tunnel exited".to_string(),
                    };
                    warn!("{}", reason);
                    inner.state = SessionState::Failed;
                    inner.error = Some(reason.clone());
                    status.state = SessionState::Failed;
                    status.error = Some(reason);
                    dead = inner.session.take();
                }
            }
            status
        };

        if let Some(url) = &late_url {
            self.publish_url(url).await;
        }
        if let Some(session) = dead {
            self.discard(session).await;
        }
        if status.url.is_none() {
            status.last_known_url = self.last_known_url().await;
        }
        status
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// URL of the active session, if captured.
    pub async fn url(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.session.as_ref().and_then(|s| s.url.clone())
    }

    /// URL persisted by an earlier session.
    pub async fn last_known_url(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.load().await {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not read {}: {}", store.path().display(), e);
                None
            }
        }
    }

    /// Run the health gate with this runner's checks, without starting anything.
    pub async fn check_health(&self) -> HealthStatus {
        let health = self.gate.evaluate_with(&self.config.health_checks).await;
        self.inner.lock().await.health = Some(health.clone());
        health
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

impl RunnerBuilder {
    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Local port the tunnel forwards to.
    ///
    /// Default: `5000`
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// How long `start()` waits for the URL.
    ///
    /// Default: 60 seconds
    #[must_use]
    pub fn url_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.url_wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn health_checks(mut self, checks: HealthCheckConfig) -> Self {
        self.config.health_checks = checks;
        self
    }

    /// Require internet reachability before starting.
    ///
    /// Default: `true`
    #[must_use]
    pub fn check_internet(mut self, enabled: bool) -> Self {
        self.config.health_checks.internet = enabled;
        self
    }

    /// Refuse to start while a VPN is detected.
    ///
    /// Default: `true`
    #[must_use]
    pub fn check_vpn(mut self, enabled: bool) -> Self {
        self.config.health_checks.vpn = enabled;
        self
    }

    #[must_use]
    pub fn supervisor(mut self, config: SupervisorConfig) -> Self {
        self.config.supervisor = config;
        self
    }

    /// Time a stopping process gets before it is killed.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.supervisor.grace_period = grace;
        self
    }

    #[must_use]
    pub fn backend(mut self, hint: BackendHint) -> Self {
        self.config.backend = hint;
        self
    }

    /// Persist captured URLs to `path`.
    #[must_use]
    pub fn url_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.url_file = Some(path.into());
        self
    }

    /// Use the artifact at `path` instead of searching for one.
    #[must_use]
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolver = Some(Arc::new(FixedPath::new(path)));
        self
    }

    /// Resolve the artifact with a custom resolver, e.g. one that downloads it.
    #[must_use]
    pub fn resolver(mut self, resolver: impl BinaryResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn health_gate(mut self, gate: HealthGate) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn on_url_found<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_url_found = Some(Arc::new(callback));
        self
    }

    /// Forwarded to the resolver while it downloads the artifact.
    #[must_use]
    pub fn on_download_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.on_download_progress = Some(Arc::new(callback));
        self
    }

    /// Build the runner with the configured options.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn build(self) -> Result<Runner> {
        self.config.validate()?;
        let supervisor = Supervisor::new(self.config.supervisor.clone())?;
        let store = self.config.url_file.clone().map(UrlStore::new);
        Ok(Runner {
            gate: self.gate.unwrap_or_default(),
            supervisor,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(SearchPaths::for_current_platform())),
            store,
            on_url_found: self.on_url_found,
            on_download_progress: self.on_download_progress,
            inner: Mutex::new(Inner::default()),
            config: self.config,
        })
    }
}
