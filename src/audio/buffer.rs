//! Shared audio buffer between the session driver and the playback scheduler

use std::sync::{Arc, Mutex};

/// Byte buffer with one producer (the session's audio callback) and one
/// consumer (the playback scheduler).
///
/// An append and the read-then-clear drain each run under a single lock
/// acquisition, so bytes pushed while a drain is in flight end up either in
/// the drained chunk or in the buffer for the next one, never dropped.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl AudioBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes, preserving arrival order
    pub fn push(&self, bytes: &[u8]) {
        if let Ok(mut buf) = self.inner.lock() {
            buf.extend_from_slice(bytes);
        }
    }

    /// Take the buffered bytes and leave the buffer empty
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        self.inner
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Number of buffered bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|buf| buf.len()).unwrap_or_default()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
