//! Internet reachability check

use async_trait::async_trait;
use futures::future::join_all;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Answers whether a single target accepts a connection.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn reachable(&self, target: SocketAddr, timeout: Duration) -> bool;
}

/// Plain TCP connect, closed right after it succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpReachability;

#[async_trait]
impl Reachability for TcpReachability {
    async fn reachable(&self, target: SocketAddr, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!("{} unreachable: {}", target, e);
                false
            }
            Err(_) => {
                tracing::debug!("{} timed out after {:?}", target, timeout);
                false
            }
        }
    }
}

/// Same answer for every target.
#[derive(Debug, Clone, Copy)]
pub struct FixedReachability(pub bool);

#[async_trait]
impl Reachability for FixedReachability {
    async fn reachable(&self, _target: SocketAddr, _timeout: Duration) -> bool {
        self.0
    }
}

/// Online only if every target answers.
pub async fn all_reachable(
    checker: &dyn Reachability,
    targets: &[SocketAddr],
    timeout: Duration,
) -> bool {
    join_all(targets.iter().map(|t| checker.reachable(*t, timeout)))
        .await
        .into_iter()
        .all(|ok| ok)
}
