//! Write-once URL slot shared between an output reader and its waiters

use std::time::Duration;
use tokio::sync::watch;

/// Result of waiting for the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOutcome {
    /// A URL was captured
    Captured(String),
    /// The wait expired; the backend keeps running
    TimedOut,
    /// The output stream ended without a match
    StreamClosed,
}

impl UrlOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            UrlOutcome::Captured(url) => Some(url),
            _ => None,
        }
    }

    pub fn into_url(self) -> Option<String> {
        match self {
            UrlOutcome::Captured(url) => Some(url),
            _ => None,
        }
    }
}

/// Producer side, owned by the single output reader.
#[derive(Debug)]
pub struct UrlSlot {
    tx: watch::Sender<Option<String>>,
}

/// Consumer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UrlWatch {
    rx: watch::Receiver<Option<String>>,
}

/// Create a connected slot and watch.
pub fn url_slot() -> (UrlSlot, UrlWatch) {
    let (tx, rx) = watch::channel(None);
    (UrlSlot { tx }, UrlWatch { rx })
}

impl UrlSlot {
    /// Store `url` unless a URL was already captured.
    ///
    /// Returns `true` only for the call that filled the slot.
    pub fn offer(&self, url: String) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(url);
            true
        })
    }

    pub fn is_captured(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl UrlWatch {
    /// The captured URL, if any.
    pub fn current(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Wait up to `timeout` for the URL.
    ///
    /// Returning does not affect the backend; a timed out session keeps running.
    pub async fn wait(&self, timeout: Duration) -> UrlOutcome {
        let mut rx = self.rx.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some))
            .await
            .map(|result| result.map(|url| (*url).clone()));
        match waited {
            Ok(Ok(Some(url))) => UrlOutcome::Captured(url),
            Ok(Ok(None) | Err(_)) => match self.current() {
                Some(url) => UrlOutcome::Captured(url),
                None => UrlOutcome::StreamClosed,
            },
            Err(_) => UrlOutcome::TimedOut,
        }
    }

    /// Wait up to `timeout`, discarding the reason when no URL arrives.
    pub async fn await_url(&self, timeout: Duration) -> Option<String> {
        self.wait(timeout).await.into_url()
    }
}
