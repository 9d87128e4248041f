//! Persistence of the last captured URL

use quickflare_common::Result;
use std::path::{Path, PathBuf};

/// Single-line text file holding the last captured URL.
#[derive(Debug, Clone)]
pub struct UrlStore {
    path: PathBuf,
}

impl UrlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `url`.
    pub async fn save(&self, url: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, url.trim()).await?;
        Ok(())
    }

    /// The stored URL, or `None` if the file is missing or blank.
    pub async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(ToString::to_string)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> UrlStore {
        UrlStore::new(
            std::env::temp_dir()
                .join(format!("quickflare-store-{}", uuid::Uuid::new_v4()))
                .join(".cf"),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        assert_eq!(temp_store().load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = temp_store();
        store.save("https://saved-url.trycloudflare.com").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("https://saved-url.trycloudflare.com")
        );
        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw, "https://saved-url.trycloudflare.com");
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = temp_store();
        store.save("https://old.trycloudflare.com").await.unwrap();
        store.save("https://new.trycloudflare.com").await.unwrap();
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("https://new.trycloudflare.com")
        );
    }
}
