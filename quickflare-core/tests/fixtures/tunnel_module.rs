//! Stand-in tunnel module exporting the module entry points.
//!
//! Built as a cdylib by the crate's unit tests. Each `Stop` call bumps a
//! generation counter; a running tunnel loop ends once the generation moves.

use std::ffi::{c_char, c_int, CStr};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static GENERATION: AtomicI32 = AtomicI32::new(0);

fn port_of(args: *const c_char) -> String {
    if args.is_null() {
        return "0".to_string();
    }
    // SAFETY: callers pass a NUL-terminated run string.
    let args = unsafe { CStr::from_ptr(args) }.to_string_lossy();
    args.split_whitespace()
        .find_map(|word| word.strip_prefix("http://localhost:"))
        .unwrap_or("0")
        .to_string()
}

fn serve(port: &str, generation: i32) {
    eprintln!("2024-06-01T00:00:00Z INF Requesting new quick Tunnel on trycloudflare.com...");
    eprintln!("2024-06-01T00:00:01Z INF |  https://module-{port}.trycloudflare.com  |");
    while GENERATION.load(Ordering::Acquire) == generation {
        thread::sleep(Duration::from_millis(10));
    }
}

#[no_mangle]
pub extern "C" fn CloudflaredInit() -> c_int {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        1
    } else {
        0
    }
}

/// Blocks until `CloudflaredStop`.
#[no_mangle]
pub extern "C" fn CloudflaredRunSync(args: *const c_char) -> c_int {
    let generation = GENERATION.load(Ordering::Acquire);
    serve(&port_of(args), generation);
    0
}

/// Starts the tunnel in the background and returns at once.
#[no_mangle]
pub extern "C" fn CloudflaredRun(args: *const c_char) -> c_int {
    let generation = GENERATION.load(Ordering::Acquire);
    let port = port_of(args);
    thread::spawn(move || serve(&port, generation));
    0
}

#[no_mangle]
pub extern "C" fn CloudflaredStop() -> c_int {
    GENERATION.fetch_add(1, Ordering::AcqRel);
    0
}

#[no_mangle]
pub extern "C" fn CloudflaredVersion() -> *const c_char {
    b"fixture 2024.6.1\0".as_ptr().cast()
}

#[no_mangle]
pub extern "C" fn FixtureRunFails(_args: *const c_char) -> c_int {
    2
}

/// Number of `CloudflaredStop` calls so far.
#[no_mangle]
pub extern "C" fn FixtureStopCalls() -> c_int {
    GENERATION.load(Ordering::Acquire)
}
