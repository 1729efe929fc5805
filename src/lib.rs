//! Parlance - streaming voice conversation client
//!
//! Opens a websocket session to a hosted conversational speech service,
//! streams input audio to it, and plays the synthesized replies through the
//! local output device. The service owns recognition, dialogue, and
//! synthesis; the interesting local piece is the playback buffer, which
//! trades a little startup latency for stutter-free output.
//!
//! # Architecture
//!
//! ```text
//! stdin audio ──► session driver ══ websocket ══► speech service
//!                       │                              │
//!                       │ binary frames (synth audio)  │
//!                       ▼                              │
//!                 shared buffer ◄──────────────────────┘
//!                       │
//!                       ▼
//!               playback scheduler ──► output device
//! ```
//!
//! The session driver and the playback scheduler run as separate tasks and
//! meet only at the shared buffer.

pub mod audio;
pub mod config;
pub mod error;
pub mod session;

pub use audio::{AudioBuffer, AudioSink, CpalSink, PlaybackScheduler, PlaybackState};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{AudioSettings, ConversationConfig, FlowClient, SessionDriver};
