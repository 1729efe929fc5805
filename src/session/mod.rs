//! Session with the hosted conversational speech service
//!
//! The service does the heavy lifting (recognition, dialogue, synthesis);
//! this crate only needs a narrow interface to it: register a handler for
//! inbound audio, then drive one long-running conversation to completion.

mod flow;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::Result;
use crate::audio::SAMPLE_RATE;

pub use flow::FlowClient;

/// Callback invoked for every binary audio payload the service pushes
pub type AudioHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Audio format sent to and expected from the service
#[derive(Debug, Clone, Serialize)]
pub struct AudioSettings {
    /// Container type ("raw" for headerless PCM)
    #[serde(rename = "type")]
    pub kind: String,
    /// Sample encoding
    pub encoding: String,
    /// Samples per second
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            kind: "raw".to_string(),
            encoding: "pcm_s16le".to_string(),
            sample_rate: SAMPLE_RATE,
        }
    }
}

/// Conversation setup passed to the service at session start
#[derive(Debug, Clone, Serialize)]
pub struct ConversationConfig {
    /// Conversation template the service starts from
    pub template_id: String,
    /// Free-form variables substituted into the template
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub template_variables: HashMap<String, String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            template_id: "default".to_string(),
            template_variables: HashMap::new(),
        }
    }
}

/// Narrow interface to the remote conversational speech service
#[async_trait]
pub trait SessionDriver {
    /// Register the handler invoked for every inbound audio payload
    fn set_audio_handler(&mut self, handler: AudioHandler);

    /// Drive one conversation to completion
    ///
    /// Streams `input` audio to the service and dispatches its audio
    /// replies to the registered handler. Returns when the service ends
    /// the conversation or the connection closes.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be established or fails mid-run
    async fn run(
        &mut self,
        input: Box<dyn AsyncRead + Send + Unpin>,
        settings: AudioSettings,
        conversation: ConversationConfig,
    ) -> Result<()>;
}
