//! Streaming playback scheduler
//!
//! Drains the shared audio buffer to the output device on a fixed poll
//! cadence. Starting and continuing playback use different thresholds:
//! the first flush waits for half a second of audio to accumulate (absorbs
//! network jitter that would otherwise produce choppy output), while an
//! active playback flushes whatever arrived on every poll (keeps latency
//! from building up once the stream is rolling).

use std::time::Duration;

use crate::audio::{AudioBuffer, AudioSink};
use crate::Result;

/// Bytes that must accumulate before playback starts
/// (0.5 seconds of 16kHz 16-bit mono audio)
pub const MIN_BUFFER: usize = 16_000;

/// Poll period of the scheduler
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// State of the playback scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Waiting for enough audio to accumulate
    Idle,
    /// Actively flushing buffered audio every poll
    Playing,
}

/// Releases the sink on drop: close, stop, terminate, in that order.
///
/// The scheduler never returns from its run loop normally, so this is the
/// path by which the device is released on error and on task cancellation.
struct SinkGuard<S: AudioSink> {
    sink: S,
}

impl<S: AudioSink> SinkGuard<S> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write(bytes)
    }
}

impl<S: AudioSink> Drop for SinkGuard<S> {
    fn drop(&mut self) {
        self.sink.close();
        self.sink.stop();
        self.sink.terminate();
    }
}

/// Decides on each poll tick whether buffered audio goes to the device
pub struct PlaybackScheduler<S: AudioSink> {
    buffer: AudioBuffer,
    sink: SinkGuard<S>,
    state: PlaybackState,
}

impl<S: AudioSink> PlaybackScheduler<S> {
    /// Create a scheduler draining `buffer` into `sink`
    pub fn new(buffer: AudioBuffer, sink: S) -> Self {
        Self {
            buffer,
            sink: SinkGuard { sink },
            state: PlaybackState::Idle,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    /// One poll tick: decide, flush, update state
    ///
    /// Flushes when playback is active, or when the buffer has grown past
    /// `MIN_BUFFER` (strictly). A flush that finds the buffer already
    /// drained returns the scheduler to idle; the next playback then waits
    /// for a full initial accumulation again.
    ///
    /// # Errors
    ///
    /// Returns error if the sink rejects a write
    pub fn tick(&mut self) -> Result<()> {
        let buffered = self.buffer.len();

        if self.state == PlaybackState::Playing || buffered > MIN_BUFFER {
            let chunk = self.buffer.take();
            if chunk.is_empty() {
                tracing::trace!("buffer drained, playback idle");
                self.state = PlaybackState::Idle;
            } else {
                self.sink.write(&chunk)?;
                if self.state == PlaybackState::Idle {
                    tracing::debug!(bytes = chunk.len(), "playback started");
                }
                self.state = PlaybackState::Playing;
            }
        }

        Ok(())
    }

    /// Run the poll loop until cancelled
    ///
    /// The loop has no terminal state; it ends only through a sink error or
    /// by the enclosing task being aborted. The sink is released on every
    /// exit path, including cancellation at the poll-interval await.
    ///
    /// # Errors
    ///
    /// Returns error if a tick fails
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.tick()?;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl AudioSink for NullSink {
        fn write(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
        fn stop(&mut self) {}
        fn terminate(&mut self) {}
    }

    #[test]
    fn test_idle_below_threshold() {
        let buffer = AudioBuffer::new();
        let mut scheduler = PlaybackScheduler::new(buffer.clone(), NullSink);

        buffer.push(&vec![0u8; MIN_BUFFER]);
        scheduler.tick().unwrap();

        assert_eq!(scheduler.state(), PlaybackState::Idle);
        assert_eq!(buffer.len(), MIN_BUFFER);
    }

    #[test]
    fn test_flush_above_threshold() {
        let buffer = AudioBuffer::new();
        let mut scheduler = PlaybackScheduler::new(buffer.clone(), NullSink);

        buffer.push(&vec![0u8; MIN_BUFFER + 1]);
        scheduler.tick().unwrap();

        assert_eq!(scheduler.state(), PlaybackState::Playing);
        assert!(buffer.is_empty());
    }
}
