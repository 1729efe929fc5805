//! Audio output to the local playback device

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for conversation audio (16kHz speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Interface to the playback device.
///
/// Writes queue raw little-endian 16-bit mono samples. Release happens in
/// three deterministic steps (close, stop, terminate, in that order) so
/// that device-backed implementations can mirror stream shutdown ordering;
/// each step must be idempotent.
pub trait AudioSink: Send {
    /// Queue raw audio bytes for playback
    ///
    /// # Errors
    ///
    /// Returns error if the sink is closed or the device rejected the write
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Close the sink; no further writes are accepted
    fn close(&mut self);

    /// Stop playback, discarding anything still queued
    fn stop(&mut self);

    /// Release the underlying device
    fn terminate(&mut self);
}

/// Plays queued samples through the default output device.
///
/// cpal streams are not `Send`, so the device and stream live on a
/// dedicated thread; this handle only touches the shared sample queue and
/// the shutdown flag.
pub struct CpalSink {
    queue: Arc<Mutex<VecDeque<i16>>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    closed: bool,
    /// Dangling low byte from an odd-length write, paired on the next one
    remainder: Option<u8>,
}

impl CpalSink {
    /// Open a mono 16kHz output stream on the default device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available or no supported
    /// configuration matches
    pub fn new() -> Result<Self> {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_queue = Arc::clone(&queue);
        let thread_shutdown = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_stream(&thread_queue, &thread_shutdown, &ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                queue,
                shutdown,
                thread: Some(thread),
                closed: false,
                remainder: None,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Audio(
                "audio output thread exited before opening the device".to_string(),
            )),
        }
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Audio("sink is closed".to_string()));
        }

        let mut queue = self
            .queue
            .lock()
            .map_err(|_| Error::Audio("sample queue poisoned".to_string()))?;
        queue_samples(&mut queue, &mut self.remainder, bytes);

        tracing::trace!(bytes = bytes.len(), queued = queue.len() * 2, "queued audio");
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn stop(&mut self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn terminate(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            tracing::debug!("audio output released");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
        self.stop();
        self.terminate();
    }
}

/// Pair little-endian bytes into samples and append them to the queue.
///
/// A flush must carry the entire buffer contents, but frames from the
/// service are not guaranteed to hold a whole number of samples. A dangling
/// low byte is kept in `remainder` and paired with the first byte of the
/// next write; dropping it instead would byte-shift every later sample.
fn queue_samples(queue: &mut VecDeque<i16>, remainder: &mut Option<u8>, bytes: &[u8]) {
    let mut data = bytes;

    if let Some(low) = remainder.take() {
        if let Some((&high, rest)) = data.split_first() {
            queue.push_back(i16::from_le_bytes([low, high]));
            data = rest;
        } else {
            *remainder = Some(low);
        }
    }

    for pair in data.chunks_exact(2) {
        queue.push_back(i16::from_le_bytes([pair[0], pair[1]]));
    }

    if data.len() % 2 == 1 {
        *remainder = data.last().copied();
    }
}

/// Owns the cpal device and stream for the lifetime of the sink.
///
/// Reports the outcome of opening the stream through `ready`, then parks
/// until the shutdown flag is set.
fn run_output_stream(
    queue: &Arc<Mutex<VecDeque<i16>>>,
    shutdown: &Arc<AtomicBool>,
    ready: &mpsc::Sender<Result<()>>,
) {
    let stream = match build_output_stream(Arc::clone(queue)) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(10));
    }

    drop(stream);
}

fn build_output_stream(queue: Arc<Mutex<VecDeque<i16>>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();
    let channels = config.channels as usize;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio output initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut queue) = queue.lock() else {
                    data.fill(0.0);
                    return;
                };
                for frame in data.chunks_mut(channels) {
                    let sample = queue
                        .pop_front()
                        .map_or(0.0, |s| f32::from(s) / 32768.0);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}
