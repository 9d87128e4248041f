//! Error scenario integration tests

use super::{fixed_gate, runner_for, script, temp_path, vpn_gate};
use quickflare::tunnel::supervisor::module_extension;
use quickflare::{BlockReason, SessionState, TunnelError};
use std::path::PathBuf;
use std::time::Duration;

fn launched_marker() -> PathBuf {
    let mut marker = script("launch-marker").into_os_string();
    marker.push(".launched");
    PathBuf::from(marker)
}

#[tokio::test]
async fn test_offline_blocks_start_before_launch() {
    let runner = runner_for("launch-marker")
        .health_gate(fixed_gate(false))
        .build()
        .unwrap();

    let err = runner.start().await.unwrap_err();
    assert!(matches!(
        err,
        TunnelError::HealthGateBlocked(BlockReason::Offline)
    ));

    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.session_id.is_none());
    assert!(!status.alive);
    assert!(!status.health.unwrap().internet_online);
    assert!(!launched_marker().exists(), "tunnel binary was executed");
}

#[tokio::test]
async fn test_vpn_blocks_start_before_launch() {
    let runner = runner_for("launch-marker")
        .health_gate(vpn_gate())
        .build()
        .unwrap();

    match runner.start().await.unwrap_err() {
        TunnelError::HealthGateBlocked(BlockReason::VpnDetected { confidence }) => {
            assert!((confidence - 0.25).abs() < 1e-9);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(runner.status().await.session_id.is_none());
    assert!(!launched_marker().exists(), "tunnel binary was executed");
}

#[tokio::test]
async fn test_disabled_checks_skip_the_gate() {
    let runner = runner_for("url")
        .health_gate(fixed_gate(false))
        .check_internet(false)
        .check_vpn(false)
        .build()
        .unwrap();

    assert!(runner.start().await.unwrap().is_some());
    assert!(runner.status().await.health.is_none());
    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_blocked_start_can_be_retried() {
    let runner = runner_for("url")
        .health_gate(fixed_gate(false))
        .build()
        .unwrap();
    assert!(runner.start().await.unwrap_err().is_blocked());
    // Failed is a startable state
    assert!(runner.start().await.unwrap_err().is_blocked());
    assert_eq!(runner.state().await, SessionState::Failed);
}

#[tokio::test]
async fn test_missing_binary() {
    let missing = temp_path("cloudflared");
    let runner = runner_for("url").binary(&missing).build().unwrap();

    match runner.start().await.unwrap_err() {
        TunnelError::BinaryNotFound(path) => assert_eq!(path, missing),
        other => panic!("unexpected error: {other}"),
    }
    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn test_unloadable_module() {
    let module = temp_path(&format!("cloudflared.{}", module_extension()));
    std::fs::write(&module, b"not a shared library").unwrap();

    let runner = runner_for("url").binary(&module).build().unwrap();
    let err = runner.start().await.unwrap_err();
    assert!(matches!(err, TunnelError::LoadFailure(_)), "{err}");
    assert_eq!(runner.state().await, SessionState::Failed);
}

#[tokio::test]
async fn test_process_exits_before_url() {
    let runner = runner_for("dies").build().unwrap();

    match runner.start().await.unwrap_err() {
        TunnelError::ProcessExitedEarly { code } => assert_eq!(code, Some(3)),
        other => panic!("unexpected error: {other}"),
    }
    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Failed);
    assert!(status.session_id.is_none());

    // Stop after a failed start is still a no-op
    runner.stop().await.unwrap();
    assert_eq!(runner.state().await, SessionState::Failed);
}

#[tokio::test]
async fn test_status_notices_dead_backend() {
    let runner = runner_for("short-lived")
        .url_wait_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    assert!(runner.start().await.unwrap().is_none());
    assert_eq!(runner.state().await, SessionState::Running);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut status = runner.status().await;
    while status.state == SessionState::Running && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
        status = runner.status().await;
    }
    assert_eq!(status.state, SessionState::Failed);
    assert!(!status.alive);
    assert!(status.error.unwrap().contains("code 4"));

    // The dead session is gone; a new start is accepted
    assert!(runner.status().await.session_id.is_none());
}
