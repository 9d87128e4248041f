//! Output capture and URL extraction
//!
//! The tunnel component only reports its public URL in console output. Two
//! readers feed a write-once [`UrlSlot`]: a line reader for spawned processes
//! and a [`ChunkScanner`] for the polled module pipe.

mod chunks;
mod lines;
mod pattern;
mod slot;

pub use chunks::ChunkScanner;
pub use lines::spawn_line_reader;
pub use pattern::UrlPattern;
pub use slot::{url_slot, UrlOutcome, UrlSlot, UrlWatch};
