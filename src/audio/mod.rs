//! Audio pipeline: shared buffer, playback scheduling, device output

mod buffer;
mod output;
mod playback;

pub use buffer::AudioBuffer;
pub use output::{AudioSink, CpalSink, SAMPLE_RATE};
pub use playback::{MIN_BUFFER, POLL_INTERVAL, PlaybackScheduler, PlaybackState};
