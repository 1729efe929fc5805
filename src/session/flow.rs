//! WebSocket session driver
//!
//! Thin client for a conversational speech service speaking a
//! JSON-control / binary-audio websocket protocol: the client opens the
//! session with a `StartConversation` message, streams raw audio as binary
//! frames, and receives synthesized audio back as binary frames.

use std::ops::ControlFlow;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use super::{AudioHandler, AudioSettings, ConversationConfig, SessionDriver};
use crate::{Error, Result};

/// Control messages sent to the service
#[derive(Debug, Serialize)]
#[serde(tag = "message")]
enum ClientMessage<'a> {
    StartConversation {
        audio_format: &'a AudioSettings,
        conversation_config: &'a ConversationConfig,
    },
    AudioEnded {
        last_seq_no: u64,
    },
}

/// Control messages received from the service
#[derive(Debug, Deserialize)]
#[serde(tag = "message")]
enum ServerMessage {
    ConversationStarted {
        id: Option<String>,
    },
    ConversationEnded {},
    AudioAdded {
        seq_no: u64,
    },
    Warning {
        reason: Option<String>,
    },
    Error {
        #[serde(rename = "type")]
        kind: Option<String>,
        reason: Option<String>,
    },
    /// Anything this client does not act on
    #[serde(other)]
    Other,
}

/// WebSocket session driver for a hosted conversation service
pub struct FlowClient {
    url: Url,
    auth_token: String,
    chunk_size: usize,
    audio_handler: Option<AudioHandler>,
}

impl FlowClient {
    /// Create a driver for the service at `url`
    #[must_use]
    pub const fn new(url: Url, auth_token: String, chunk_size: usize) -> Self {
        Self {
            url,
            auth_token,
            chunk_size,
            audio_handler: None,
        }
    }

    /// Build the websocket handshake request with the auth header
    fn handshake_request(&self) -> Result<Request<()>> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| Error::Session("service url has no host".to_string()))?;

        Request::builder()
            .method("GET")
            .uri(self.url.as_str())
            .header("Host", host)
            .header("Upgrade", "websocket")
            .header("Connection", "upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header(AUTHORIZATION, format!("Bearer {}", self.auth_token))
            .header(USER_AGENT, concat!("parlance/", env!("CARGO_PKG_VERSION")))
            .body(())
            .map_err(|e| Error::Session(format!("invalid handshake request: {e}")))
    }

    /// Dispatch one inbound frame
    ///
    /// Binary frames go to the audio handler; text frames are decoded as
    /// control messages. Frames that decode to nothing useful are dropped
    /// without comment.
    fn handle_frame(&self, frame: Message) -> Result<ControlFlow<()>> {
        match frame {
            Message::Binary(payload) => {
                tracing::trace!(bytes = payload.len(), "audio received");
                if let Some(handler) = &self.audio_handler {
                    handler(&payload);
                }
                Ok(ControlFlow::Continue(()))
            }
            Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(ServerMessage::ConversationStarted { id }) => {
                    tracing::info!(id = id.as_deref().unwrap_or("-"), "conversation started");
                    Ok(ControlFlow::Continue(()))
                }
                Ok(ServerMessage::ConversationEnded {}) => {
                    tracing::info!("conversation ended by service");
                    Ok(ControlFlow::Break(()))
                }
                Ok(ServerMessage::AudioAdded { seq_no }) => {
                    tracing::trace!(seq_no, "audio chunk acknowledged");
                    Ok(ControlFlow::Continue(()))
                }
                Ok(ServerMessage::Warning { reason }) => {
                    tracing::warn!(reason = reason.as_deref().unwrap_or("-"), "service warning");
                    Ok(ControlFlow::Continue(()))
                }
                Ok(ServerMessage::Error { kind, reason }) => Err(Error::Session(format!(
                    "{}: {}",
                    kind.as_deref().unwrap_or("error"),
                    reason.as_deref().unwrap_or("unspecified"),
                ))),
                Ok(ServerMessage::Other) | Err(_) => {
                    tracing::trace!("unhandled service message");
                    Ok(ControlFlow::Continue(()))
                }
            },
            Message::Close(_) => {
                tracing::debug!("connection closed by service");
                Ok(ControlFlow::Break(()))
            }
            // Ping/pong are handled by the transport
            _ => Ok(ControlFlow::Continue(())),
        }
    }
}

#[async_trait]
impl SessionDriver for FlowClient {
    fn set_audio_handler(&mut self, handler: AudioHandler) {
        self.audio_handler = Some(handler);
    }

    async fn run(
        &mut self,
        mut input: Box<dyn AsyncRead + Send + Unpin>,
        settings: AudioSettings,
        conversation: ConversationConfig,
    ) -> Result<()> {
        let request = self.handshake_request()?;
        tracing::debug!(url = %self.url, "connecting to conversation service");

        let (ws, response) = connect_async(request).await?;
        tracing::debug!(status = %response.status(), "websocket established");

        let (mut ws_tx, mut ws_rx) = ws.split();

        let start = ClientMessage::StartConversation {
            audio_format: &settings,
            conversation_config: &conversation,
        };
        ws_tx.send(Message::Text(serde_json::to_string(&start)?)).await?;

        let mut chunk = vec![0u8; self.chunk_size];
        let mut seq_no: u64 = 0;
        let mut input_done = false;

        loop {
            tokio::select! {
                frame = ws_rx.next() => {
                    let Some(frame) = frame else {
                        tracing::debug!("service stream ended");
                        break;
                    };
                    if self.handle_frame(frame?)?.is_break() {
                        break;
                    }
                }
                read = input.read(&mut chunk), if !input_done => {
                    let n = read?;
                    if n == 0 {
                        input_done = true;
                        tracing::debug!(chunks = seq_no, "input exhausted");
                        let ended = ClientMessage::AudioEnded { last_seq_no: seq_no };
                        ws_tx.send(Message::Text(serde_json::to_string(&ended)?)).await?;
                    } else {
                        seq_no += 1;
                        ws_tx.send(Message::Binary(chunk[..n].to_vec())).await?;
                    }
                }
            }
        }

        ws_tx.close().await.ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_conversation_shape() {
        let settings = AudioSettings::default();
        let conversation = ConversationConfig::default();
        let msg = ClientMessage::StartConversation {
            audio_format: &settings,
            conversation_config: &conversation,
        };

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(json["message"], "StartConversation");
        assert_eq!(json["audio_format"]["encoding"], "pcm_s16le");
        assert_eq!(json["audio_format"]["sample_rate"], 16_000);
        assert_eq!(json["conversation_config"]["template_id"], "default");
        assert!(json["conversation_config"].get("template_variables").is_none());
    }

    #[test]
    fn test_server_error_decodes() {
        let text = r#"{"message":"Error","type":"quota_exceeded","reason":"out of credit"}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        assert!(matches!(msg, ServerMessage::Error { .. }));
    }

    #[test]
    fn test_unknown_message_is_other() {
        let text = r#"{"message":"prompt","content":"hello"}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        assert!(matches!(msg, ServerMessage::Other));
    }
}
