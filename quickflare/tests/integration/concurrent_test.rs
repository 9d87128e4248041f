//! Concurrent use of one runner and of several runners

use super::{runner_for, UrlRecorder};
use quickflare::{SessionState, TunnelError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_starts_one_wins() {
    let runner = Arc::new(
        runner_for("silent")
            .url_wait_timeout(Duration::from_millis(300))
            .build()
            .unwrap(),
    );

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.start().await })
        })
        .collect();

    let mut started = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => started += 1,
            Err(TunnelError::AlreadyRunning) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(rejected, 3);
    assert_eq!(runner.state().await, SessionState::Running);

    runner.stop().await.unwrap();
}

#[tokio::test]
async fn test_independent_runners_do_not_share_sessions() {
    let first_urls = UrlRecorder::default();
    let second_urls = UrlRecorder::default();
    let first = first_urls.attach(runner_for("url")).build().unwrap();
    let second = second_urls
        .attach(runner_for("silent").url_wait_timeout(Duration::from_millis(200)))
        .build()
        .unwrap();

    let (a, b) = tokio::join!(first.start(), second.start());
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_none());

    let (a, b) = tokio::join!(first.status(), second.status());
    assert_ne!(a.session_id, b.session_id);
    assert!(a.url.is_some());
    assert!(b.url.is_none());
    assert_eq!(first_urls.calls(), 1);
    assert_eq!(second_urls.calls(), 0);

    first.stop().await.unwrap();
    assert_eq!(second.state().await, SessionState::Running);
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_during_url_wait() {
    let runner = Arc::new(
        runner_for("silent")
            .url_wait_timeout(Duration::from_secs(10))
            .build()
            .unwrap(),
    );

    let starting = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.start().await }
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while runner.state().await != SessionState::Running && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    runner.stop().await.unwrap();

    // The pending start returns once the output closes, without a URL
    let url = tokio::time::timeout(Duration::from_secs(5), starting)
        .await
        .expect("start did not return after stop")
        .unwrap()
        .unwrap();
    assert!(url.is_none());
    assert_eq!(runner.state().await, SessionState::Stopped);
}
