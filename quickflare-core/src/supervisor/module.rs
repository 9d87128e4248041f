//! Loaded-module backend
//!
//! The tunnel component is loaded as a shared library exporting four C entry
//! points. `Run` gets its own thread because the default entry point blocks
//! until `Stop`; an entry point that starts the tunnel in the background and
//! returns 0 works too. The module's console output is captured by
//! redirecting the process-wide standard handles into a pipe polled by a
//! reader thread.
#![allow(unsafe_code)]

use super::artifact::module_run_string;
use super::stdio::{PipeReader, ReadStatus, StdioRedirect};
use super::{BackendKind, StopOutcome, TunnelBackend};
use crate::capture::{ChunkScanner, UrlPattern, UrlSlot};
use async_trait::async_trait;
use libloading::Library;
use quickflare_common::{ModuleSymbols, Result, SupervisorConfig, TunnelError};
use std::ffi::{c_char, c_int, CStr, CString};
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type InitFn = unsafe extern "C" fn() -> c_int;
type RunFn = unsafe extern "C" fn(*const c_char) -> c_int;
type StopFn = unsafe extern "C" fn() -> c_int;
type VersionFn = unsafe extern "C" fn() -> *const c_char;

/// `Init` result meaning a previous session already initialised the module.
const ALREADY_INITIALIZED: c_int = 1;

const READ_CHUNK: usize = 4096;

#[derive(Clone, Copy)]
struct EntryPoints {
    init: InitFn,
    run: RunFn,
    stop: StopFn,
    version: VersionFn,
}

fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T> {
    // SAFETY: `T` is the C signature documented for this export.
    let symbol = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|e| TunnelError::LoadFailure(format!("missing entry point {name}: {e}")))?;
    Ok(*symbol)
}

/// Load `path` and resolve its entry points. The library is never unloaded.
fn open_module(path: &Path, symbols: &ModuleSymbols) -> Result<EntryPoints> {
    // SAFETY: loading runs the library's initialisers; the path was chosen by
    // the caller as the tunnel module.
    let library = unsafe { Library::new(path) }
        .map_err(|e| TunnelError::LoadFailure(format!("{}: {e}", path.display())))?;
    // A loaded runtime cannot be torn down safely; keep it mapped.
    let library = ManuallyDrop::new(library);

    Ok(EntryPoints {
        init: resolve(&library, &symbols.init)?,
        run: resolve(&library, &symbols.run)?,
        stop: resolve(&library, &symbols.stop)?,
        version: resolve(&library, &symbols.version)?,
    })
}

fn read_version(version: VersionFn) -> Option<String> {
    // SAFETY: Version takes no arguments and returns a NUL-terminated string or null.
    let ptr = unsafe { version() };
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null pointers from Version point at a valid C string.
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn initialize(entry: &EntryPoints, symbols: &ModuleSymbols) -> Result<()> {
    // SAFETY: Init takes no arguments.
    match unsafe { (entry.init)() } {
        0 => Ok(()),
        ALREADY_INITIALIZED => {
            debug!("Module already initialized");
            Ok(())
        }
        status => Err(TunnelError::LoadFailure(format!(
            "{} returned {status}",
            symbols.init
        ))),
    }
}

/// Poll the capture pipe until the session stops or every writer is gone.
///
/// Chunks are scanned until the first URL fills `slot`; then stdio is pointed
/// at the null device and the pipe is drained without scanning.
fn pump_output(
    mut pipe: PipeReader,
    mut scanner: ChunkScanner,
    slot: &UrlSlot,
    redirect: &Mutex<StdioRedirect>,
    running: &AtomicBool,
    poll_interval: Duration,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    while running.load(Ordering::Acquire) {
        match pipe.read_available(&mut buf) {
            Ok(ReadStatus::Data(n)) => {
                if slot.is_captured() {
                    continue;
                }
                if let Some(url) = scanner.push(&buf[..n]) {
                    if slot.offer(url) {
                        match redirect.lock() {
                            Ok(mut redirect) => {
                                if let Err(e) = redirect.silence() {
                                    warn!("Failed to silence standard streams: {}", e);
                                }
                            }
                            Err(_) => warn!("Standard stream guard poisoned"),
                        }
                    }
                }
            }
            Ok(ReadStatus::Empty) => thread::sleep(poll_interval),
            Ok(ReadStatus::Closed) | Err(_) => break,
        }
    }
}

/// Tunnel component loaded into this process.
pub struct ModuleBackend {
    stop_fn: StopFn,
    redirect: Arc<Mutex<StdioRedirect>>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    reader: Option<JoinHandle<()>>,
    runner: Option<JoinHandle<()>>,
    version: Option<String>,
    poll_interval: Duration,
}

impl ModuleBackend {
    /// Load the module, initialise it and start `Run` on a dedicated thread.
    ///
    /// The standard handles are redirected before loading on Windows, where the
    /// module caches them at load time, and right before `Run` elsewhere.
    pub fn load(
        path: &Path,
        port: u16,
        pattern: UrlPattern,
        slot: UrlSlot,
        config: &SupervisorConfig,
    ) -> Result<Self> {
        let run_args = CString::new(module_run_string(&config.module_argv0, port))
            .map_err(|_| TunnelError::Config("module run string contains a NUL byte".into()))?;

        #[cfg(windows)]
        let (redirect, pipe) = StdioRedirect::capture()?;

        let entry = open_module(path, &config.module_symbols)?;
        initialize(&entry, &config.module_symbols)?;
        let version = read_version(entry.version);
        info!(
            version = version.as_deref().unwrap_or("unknown"),
            "Loaded tunnel module {}",
            path.display()
        );

        #[cfg(not(windows))]
        let (redirect, pipe) = StdioRedirect::capture()?;

        let redirect = Arc::new(Mutex::new(redirect));
        let running = Arc::new(AtomicBool::new(true));
        let finished = Arc::new(AtomicBool::new(false));
        let fault = Arc::new(Mutex::new(None));

        let reader = thread::Builder::new()
            .name("quickflare-module-output".into())
            .spawn({
                let redirect = Arc::clone(&redirect);
                let running = Arc::clone(&running);
                let scanner = ChunkScanner::new(pattern);
                let poll_interval = config.poll_interval;
                move || pump_output(pipe, scanner, &slot, &redirect, &running, poll_interval)
            })?;

        let run = entry.run;
        let spawned = thread::Builder::new()
            .name("quickflare-module-run".into())
            .spawn({
                let finished = Arc::clone(&finished);
                let fault = Arc::clone(&fault);
                move || {
                    // SAFETY: `run_args` outlives the call, which returns before the thread ends.
                    let status = unsafe { run(run_args.as_ptr()) };
                    if status != 0 {
                        if let Ok(mut fault) = fault.lock() {
                            *fault = Some(format!("module Run returned {status}"));
                        }
                    }
                    finished.store(true, Ordering::Release);
                }
            });

        let mut backend = Self {
            stop_fn: entry.stop,
            redirect,
            running,
            finished,
            fault,
            reader: Some(reader),
            runner: None,
            version,
            poll_interval: config.poll_interval,
        };
        // On failure, dropping `backend` restores stdio and stops the reader
        backend.runner = Some(spawned?);
        Ok(backend)
    }

    fn restore_stdio(&self) {
        match self.redirect.lock() {
            Ok(mut redirect) => {
                if let Err(e) = redirect.restore() {
                    warn!("Failed to restore standard streams: {}", e);
                }
            }
            Err(_) => warn!("Standard stream guard poisoned"),
        }
    }

    /// Clear the running flag and call `Stop`, whether or not `Run` has
    /// returned. Returns false if the session was already stopped.
    fn signal_stop(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        // SAFETY: Stop takes no arguments; it ends the tunnel and unblocks a pending Run.
        let status = unsafe { (self.stop_fn)() };
        if status != 0 {
            warn!("Module Stop returned {}", status);
        }
        true
    }
}

#[async_trait]
impl TunnelBackend for ModuleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LoadedModule
    }

    /// Running until stopped or until `Run` reports a non-zero status. `Run`
    /// returning 0 is not an exit: the tunnel may keep running in the background.
    fn is_alive(&mut self) -> bool {
        self.running.load(Ordering::Acquire) && self.fault().is_none()
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn fault(&self) -> Option<String> {
        self.fault.lock().ok().and_then(|fault| fault.clone())
    }

    async fn stop(&mut self, grace: Duration) -> Result<StopOutcome> {
        let stopped = self.signal_stop();
        self.restore_stdio();

        if let Some(reader) = self.reader.take() {
            let _ = tokio::task::spawn_blocking(move || reader.join()).await;
        }

        let deadline = Instant::now() + grace;
        while !self.finished.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                warn!("Module did not return from Run within {:?}", grace);
                return Err(TunnelError::ShutdownTimeout(grace));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        if let Some(runner) = self.runner.take() {
            let _ = tokio::task::spawn_blocking(move || runner.join()).await;
        }

        Ok(if stopped && self.fault().is_none() {
            StopOutcome::Graceful
        } else {
            StopOutcome::AlreadyExited
        })
    }
}

impl Drop for ModuleBackend {
    fn drop(&mut self) {
        self.signal_stop();
        self.restore_stdio();
    }
}
