#![allow(clippy::unwrap_used, clippy::expect_used)]
#![cfg(unix)]

//! Integration tests for `quickflare`
//!
//! These drive a real [`Runner`] against shell scripts that behave like the
//! tunnel binary: print a URL on stderr, stay silent, or die.

mod concurrent_test;
mod error_test;
mod tunnel_test;

use quickflare::health::{FixedProbe, FixedReachability, HealthGate, Signal};
use quickflare::{Runner, RunnerBuilder};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const VERSION: &str = "[ \"$1\" = \"--version\" ] && { echo 'cloudflared version 2024.6.1'; exit 0; }";

const SCRIPTS: &[(&str, &str)] = &[
    (
        "url",
        "echo 'INF Requesting new quick Tunnel on trycloudflare.com...' >&2\n\
         echo 'INF |  https://first-tunnel.trycloudflare.com  |' >&2\n\
         echo 'INF |  https://second-tunnel.trycloudflare.com  |' >&2\n\
         exec sleep 30",
    ),
    (
        "late",
        "sleep 1\necho 'INF |  https://late-tunnel.trycloudflare.com  |' >&2\nexec sleep 30",
    ),
    ("silent", "echo 'INF Starting tunnel' >&2\nexec sleep 30"),
    ("dies", "echo 'ERR failed to reach the edge' >&2\nexit 3"),
    ("short-lived", "echo 'INF Starting tunnel' >&2\nsleep 1\nexit 4"),
    ("launch-marker", "touch \"$0.launched\"\nexec sleep 30"),
];

/// Fixture directory; every script is written before the first one runs.
pub fn fixture_dir() -> &'static PathBuf {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("quickflare-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in SCRIPTS {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{VERSION}\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
}

pub fn script(name: &str) -> PathBuf {
    fixture_dir().join(name)
}

/// A fresh path under the fixture directory.
pub fn temp_path(name: &str) -> PathBuf {
    fixture_dir().join(format!("{}-{name}", uuid::Uuid::new_v4()))
}

/// Gate with no probes and a fixed reachability verdict.
pub fn fixed_gate(online: bool) -> HealthGate {
    HealthGate::new(Vec::new(), Arc::new(FixedReachability(online)))
}

/// Online gate whose virtual-interface probe always fires.
pub fn vpn_gate() -> HealthGate {
    HealthGate::new(
        vec![Arc::new(FixedProbe::new(Signal::VirtualInterface, true))],
        Arc::new(FixedReachability(true)),
    )
}

/// Runner for `script` behind an online, VPN-free gate.
pub fn runner_for(script_name: &str) -> RunnerBuilder {
    init_logging();
    Runner::builder()
        .binary(script(script_name))
        .health_gate(fixed_gate(true))
        .url_wait_timeout(Duration::from_secs(5))
        .grace_period(Duration::from_secs(2))
}

/// Counts `on_url_found` calls and keeps the last URL.
#[derive(Clone, Default)]
pub struct UrlRecorder {
    calls: Arc<AtomicUsize>,
    last: Arc<std::sync::Mutex<Option<String>>>,
}

impl UrlRecorder {
    pub fn attach(&self, builder: RunnerBuilder) -> RunnerBuilder {
        let recorder = self.clone();
        builder.on_url_found(move |url| {
            recorder.calls.fetch_add(1, Ordering::SeqCst);
            *recorder.last.lock().unwrap() = Some(url.to_string());
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<String> {
        self.last.lock().unwrap().clone()
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
