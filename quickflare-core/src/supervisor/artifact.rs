//! Artifact type detection and tunnel arguments

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How the tunnel component is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A child process with piped stderr
    SpawnedProcess,
    /// A shared library loaded into this process
    LoadedModule,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::SpawnedProcess => f.write_str("process"),
            BackendKind::LoadedModule => f.write_str("module"),
        }
    }
}

/// Caller preference for backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendHint {
    /// Decide from the artifact type
    #[default]
    Auto,
    /// Always spawn a process
    Spawn,
    /// Always load as a module
    Module,
}

impl FromStr for BackendHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendHint::Auto),
            "spawn" | "process" => Ok(BackendHint::Spawn),
            "module" | "library" => Ok(BackendHint::Module),
            other => Err(format!(
                "unknown backend '{other}' (expected auto, spawn or module)"
            )),
        }
    }
}

/// Shared library extension of the host platform.
pub fn module_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// Whether `path` names a shared library loadable on this platform.
pub fn is_module_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(module_extension()))
}

/// Pick the backend for `path` under `hint`.
pub fn select_backend(path: &Path, hint: BackendHint) -> BackendKind {
    match hint {
        BackendHint::Spawn => BackendKind::SpawnedProcess,
        BackendHint::Module => BackendKind::LoadedModule,
        BackendHint::Auto if is_module_artifact(path) => BackendKind::LoadedModule,
        BackendHint::Auto => BackendKind::SpawnedProcess,
    }
}

/// Arguments for a quick tunnel to `localhost:<port>` over HTTP/2.
pub fn tunnel_args(port: u16) -> Vec<String> {
    vec![
        "tunnel".to_string(),
        "--url".to_string(),
        format!("http://localhost:{port}"),
        "--protocol".to_string(),
        "http2".to_string(),
    ]
}

/// Run string handed to the module; it splits this into its own argv.
pub fn module_run_string(argv0: &str, port: u16) -> String {
    let mut words = vec![argv0.to_string()];
    words.extend(tunnel_args(port));
    words.join(" ")
}
