//! Chunk-oriented capture for redirected module output

use super::UrlPattern;

/// Buffer size above which the oldest bytes are dropped.
const MAX_BUFFERED: usize = 256 * 1024;

/// Bytes kept when the buffer is trimmed; longer than any URL.
const KEPT_TAIL: usize = 4 * 1024;

/// Accumulates raw output and rescans all of it on every push, so a URL
/// split across two reads is still found.
#[derive(Debug)]
pub struct ChunkScanner {
    pattern: UrlPattern,
    buffer: Vec<u8>,
}

impl ChunkScanner {
    pub fn new(pattern: UrlPattern) -> Self {
        Self {
            pattern,
            buffer: Vec::with_capacity(8 * 1024),
        }
    }

    /// Append `chunk` and return the first URL in everything seen so far.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        self.buffer.extend_from_slice(chunk);
        let found = self.pattern.find_bytes(&self.buffer);
        if found.is_none() && self.buffer.len() > MAX_BUFFERED {
            let cut = self.buffer.len() - KEPT_TAIL;
            self.buffer.drain(..cut);
        }
        found
    }

    /// Bytes currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
