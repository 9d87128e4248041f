//! Stand-ins for the tunnel binary and the tunnel module

use crate::supervisor::module_extension;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

/// Held by every test that redirects the process-wide standard streams.
pub(crate) static STDIO: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

const SCRIPTS: &[(&str, &str)] = &[
    ("version", "echo 'cloudflared version 2024.6.1'"),
    (
        "args",
        "[ \"$1\" = \"--version\" ] && exit 0\necho \"https://args-$5.trycloudflare.com $*\" >&2\nexec sleep 30",
    ),
    (
        "stubborn",
        "[ \"$1\" = \"--version\" ] && exit 0\ntrap '' TERM\nwhile true; do sleep 1; done",
    ),
    ("dies", "[ \"$1\" = \"--version\" ] && exit 0\nexit 3"),
    (
        "silent",
        "[ \"$1\" = \"--version\" ] && exit 0\nexec sleep 30",
    ),
];

// Every script is written before any test spawns a process, so no forked
// child can still hold a script open for writing (ETXTBSY).
pub(crate) fn script(name: &str) -> PathBuf {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    let dir = DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("quickflare-core-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in SCRIPTS {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    });
    dir.join(name)
}

/// The fixture module from `tests/fixtures`, compiled once per test run.
pub(crate) fn tunnel_module() -> PathBuf {
    static MODULE: OnceLock<PathBuf> = OnceLock::new();
    MODULE
        .get_or_init(|| {
            let dir =
                std::env::temp_dir().join(format!("quickflare-module-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            let out = dir.join(format!("libquickflare_fixture.{}", module_extension()));
            let rustc = std::env::var_os("RUSTC").unwrap_or_else(|| "rustc".into());
            let status = Command::new(rustc)
                .args(["--crate-type", "cdylib", "--crate-name", "quickflare_fixture"])
                .args(["--edition", "2021", "-o"])
                .arg(&out)
                .arg(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/tunnel_module.rs"))
                .status()
                .unwrap();
            assert!(status.success(), "fixture module failed to build");
            out
        })
        .clone()
}
