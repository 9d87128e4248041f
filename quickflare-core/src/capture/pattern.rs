//! Public URL pattern

use quickflare_common::{Result, TunnelError, DEFAULT_URL_SUFFIX};
use regex::Regex;

/// Matches `https://<label>.<suffix>` where the label is `[a-z0-9-]+`.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    regex: Regex,
}

impl UrlPattern {
    /// Build a pattern for the given domain suffix (e.g. `trycloudflare.com`).
    pub fn new(suffix: &str) -> Result<Self> {
        let suffix = suffix.trim_matches('.');
        if suffix.is_empty() {
            return Err(TunnelError::Config("URL suffix must not be empty".into()));
        }
        let regex = Regex::new(&format!(r"https://[a-z0-9-]+\.{}", regex::escape(suffix)))
            .map_err(|e| TunnelError::Config(format!("Invalid URL suffix: {e}")))?;
        Ok(Self { regex })
    }

    /// Pattern for quick-tunnel URLs.
    pub fn quick_tunnel() -> Result<Self> {
        Self::new(DEFAULT_URL_SUFFIX)
    }

    /// First match in `text`.
    pub fn find(&self, text: &str) -> Option<String> {
        self.regex.find(text).map(|m| m.as_str().to_string())
    }

    /// First match in raw output, decoded lossily.
    pub fn find_bytes(&self, bytes: &[u8]) -> Option<String> {
        self.find(&String::from_utf8_lossy(bytes))
    }
}
