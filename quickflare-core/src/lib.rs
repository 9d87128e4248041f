//! Tunnel supervision for `quickflare`
//!
//! [`supervisor`] drives the external tunnel component as a child process or
//! as a loaded module, and [`capture`] pulls the public URL out of whatever it
//! prints.

pub mod capture;
pub mod supervisor;

#[cfg(all(test, unix))]
mod test_support;

pub use capture::{url_slot, UrlOutcome, UrlPattern, UrlSlot, UrlWatch};
pub use supervisor::{
    BackendHint, BackendKind, StopOutcome, Supervisor, TunnelBackend, TunnelHandle,
};
