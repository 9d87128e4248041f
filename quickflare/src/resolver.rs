//! Locating the tunnel artifact
//!
//! Downloading and verifying the artifact is left to the embedding
//! application; it plugs in through [`BinaryResolver`] and reports progress
//! with [`DownloadProgress`].

use async_trait::async_trait;
use quickflare_common::{Result, TunnelError};
use quickflare_core::supervisor::module_extension;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const BASE_NAME: &str = "cloudflared";

/// Progress of an artifact download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    /// Total size, 0 when unknown
    pub total: u64,
    /// 0.0 to 100.0
    pub percent: f64,
}

impl DownloadProgress {
    pub fn new(downloaded: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (downloaded as f64 / total as f64 * 100.0).min(100.0)
        };
        Self {
            downloaded,
            total,
            percent,
        }
    }
}

/// Receives download progress notifications.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Produces the path of the tunnel binary or module for this host.
#[async_trait]
pub trait BinaryResolver: Send + Sync {
    /// Resolve the artifact, reporting download progress if any happens.
    async fn resolve(&self, progress: Option<&ProgressCallback>) -> Result<PathBuf>;
}

/// A resolver that always answers with one path.
#[derive(Debug, Clone)]
pub struct FixedPath(pub PathBuf);

impl FixedPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

#[async_trait]
impl BinaryResolver for FixedPath {
    async fn resolve(&self, _progress: Option<&ProgressCallback>) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

fn machine_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "arm" => "arm",
        other => other,
    }
}

fn is_android() -> bool {
    cfg!(target_os = "android")
        || std::env::var_os("ANDROID_ROOT").is_some()
        || std::env::var_os("ANDROID_DATA").is_some()
        || std::env::var("PREFIX").is_ok_and(|prefix| prefix.contains("com.termux"))
}

/// Platform key used in artifact names, e.g. `linux-amd64` or `darwin-arm64`.
pub fn platform_key() -> String {
    let os = if is_android() {
        "android"
    } else {
        match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        }
    };
    format!("{os}-{}", machine_arch())
}

/// Looks for the artifact under a list of directories.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    dirs: Vec<PathBuf>,
    names: Vec<String>,
}

impl SearchPaths {
    pub fn new(dirs: Vec<PathBuf>, names: Vec<String>) -> Self {
        Self { dirs, names }
    }

    /// `.`, `binaries` and `binaries/<key>`, executables before modules.
    pub fn for_current_platform() -> Self {
        let key = platform_key();
        let exe = std::env::consts::EXE_SUFFIX;
        let ext = module_extension();
        let names = vec![
            format!("{BASE_NAME}{exe}"),
            format!("{BASE_NAME}-{key}{exe}"),
            format!("{BASE_NAME}.{ext}"),
            format!("{BASE_NAME}-{key}.{ext}"),
        ];
        let dirs = vec![
            PathBuf::from("."),
            PathBuf::from("binaries"),
            Path::new("binaries").join(&key),
        ];
        Self { dirs, names }
    }

    /// Same names, searched under `root` instead of the working directory.
    #[must_use]
    pub fn under(mut self, root: &Path) -> Self {
        self.dirs = self.dirs.iter().map(|dir| root.join(dir)).collect();
        self
    }

    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.dirs
            .iter()
            .flat_map(move |dir| self.names.iter().map(move |name| dir.join(name)))
    }
}

#[async_trait]
impl BinaryResolver for SearchPaths {
    async fn resolve(&self, _progress: Option<&ProgressCallback>) -> Result<PathBuf> {
        for candidate in self.candidates() {
            if tokio::fs::metadata(&candidate)
                .await
                .is_ok_and(|meta| meta.is_file())
            {
                debug!("Resolved tunnel artifact {}", candidate.display());
                return Ok(candidate);
            }
        }
        let expected = self
            .candidates()
            .next()
            .unwrap_or_else(|| PathBuf::from(BASE_NAME));
        Err(TunnelError::BinaryNotFound(expected))
    }
}
