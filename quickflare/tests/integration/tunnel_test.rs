//! Session lifecycle tests

use super::{runner_for, temp_path, UrlRecorder};
use quickflare::{SessionState, TunnelError, UrlStore};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_start_captures_first_url() {
    let recorder = UrlRecorder::default();
    let url_file = temp_path("url");
    let runner = recorder
        .attach(runner_for("url").url_file(&url_file))
        .build()
        .unwrap();

    let url = runner.start().await.expect("start should succeed");
    assert_eq!(url.as_deref(), Some("https://first-tunnel.trycloudflare.com"));

    // The second URL in the output never replaces the first
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Running);
    assert!(status.alive);
    assert_eq!(
        status.url.as_deref(),
        Some("https://first-tunnel.trycloudflare.com")
    );
    assert_eq!(status.version.as_deref(), Some("cloudflared version 2024.6.1"));

    assert_eq!(recorder.calls(), 1);
    let saved = UrlStore::new(&url_file).load().await.unwrap();
    assert_eq!(saved.as_deref(), Some("https://first-tunnel.trycloudflare.com"));

    runner.stop().await.unwrap();
    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Stopped);
    assert!(status.url.is_none());
    assert!(!status.alive);
    assert_eq!(recorder.calls(), 1);
}

#[tokio::test]
async fn test_stop_without_start_is_noop() {
    let runner = runner_for("url").build().unwrap();
    runner.stop().await.unwrap();
    runner.stop().await.unwrap();
    assert_eq!(runner.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_second_start_rejected() {
    let runner = runner_for("url").build().unwrap();
    let first = runner.start().await.unwrap();
    let first_status = runner.status().await;

    let err = runner.start().await.unwrap_err();
    assert!(matches!(err, TunnelError::AlreadyRunning));

    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Running);
    assert_eq!(status.url, first);
    assert_eq!(status.session_id, first_status.session_id);
    assert!(status.alive);

    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_url_timeout_leaves_tunnel_running() {
    let runner = runner_for("silent")
        .url_wait_timeout(Duration::from_millis(400))
        .build()
        .unwrap();

    let started = Instant::now();
    let url = runner.start().await.expect("a missing URL is not an error");
    let waited = started.elapsed();
    assert!(url.is_none());
    assert!(waited >= Duration::from_millis(400), "returned after {waited:?}");
    assert!(waited < Duration::from_secs(5), "returned after {waited:?}");

    let status = runner.status().await;
    assert_eq!(status.state, SessionState::Running);
    assert!(status.alive);
    assert!(status.url.is_none());

    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_late_url_picked_up_by_status() {
    let recorder = UrlRecorder::default();
    let url_file = temp_path("late");
    let runner = recorder
        .attach(
            runner_for("late")
                .url_wait_timeout(Duration::from_millis(100))
                .url_file(&url_file),
        )
        .build()
        .unwrap();

    assert!(runner.start().await.unwrap().is_none());
    assert_eq!(recorder.calls(), 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut status = runner.status().await;
    while status.url.is_none() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
        status = runner.status().await;
    }
    assert_eq!(
        status.url.as_deref(),
        Some("https://late-tunnel.trycloudflare.com")
    );

    runner.status().await;
    assert_eq!(recorder.calls(), 1);
    assert_eq!(recorder.last(), status.url);
    let saved = UrlStore::new(&url_file).load().await.unwrap();
    assert_eq!(saved, status.url);

    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_last_known_url_when_session_has_none() {
    let url_file = temp_path("known");
    UrlStore::new(&url_file)
        .save("https://earlier-run.trycloudflare.com")
        .await
        .unwrap();

    let runner = runner_for("silent")
        .url_wait_timeout(Duration::from_millis(100))
        .url_file(&url_file)
        .build()
        .unwrap();
    assert!(runner.start().await.unwrap().is_none());

    let status = runner.status().await;
    assert!(status.url.is_none());
    assert_eq!(
        status.last_known_url.as_deref(),
        Some("https://earlier-run.trycloudflare.com")
    );
    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_starts_new_session() {
    let recorder = UrlRecorder::default();
    let runner = recorder.attach(runner_for("url")).build().unwrap();

    runner.start().await.unwrap();
    let first = runner.status().await.session_id.unwrap();

    let url = runner.restart().await.unwrap();
    assert_eq!(url.as_deref(), Some("https://first-tunnel.trycloudflare.com"));
    let second = runner.status().await.session_id.unwrap();
    assert_ne!(first, second);

    // Once per session
    assert_eq!(recorder.calls(), 2);
    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_from_idle_starts() {
    let runner = runner_for("url").build().unwrap();
    assert!(runner.restart().await.unwrap().is_some());
    assert_eq!(runner.state().await, SessionState::Running);
    runner.stop().await.unwrap();
}
