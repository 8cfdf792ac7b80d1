//! Remote voice channel collaborator
//!
//! The gateway treats the bidirectional streaming connection as a
//! collaborator behind the [`LiveConnector`]/[`LiveChannel`] traits: a
//! connector performs the handshake and hands back a send handle plus a
//! stream of inbound events. Transport details live entirely behind this
//! seam.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::Result;
use crate::voice::codec::AudioChunk;

/// Response modality requested from the remote model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    /// Synthesized speech
    Audio,
}

/// Connection parameters for opening a live channel
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Model identifier
    pub model: String,

    /// Requested output modality
    pub modality: ResponseModality,

    /// Ask the remote to transcribe its own audio output
    pub output_transcription: bool,

    /// Voice persona system instruction
    pub system_instruction: String,
}

impl ConnectParams {
    /// Audio-modality parameters with output transcription enabled
    #[must_use]
    pub fn audio(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            modality: ResponseModality::Audio,
            output_transcription: true,
            system_instruction: system_instruction.into(),
        }
    }
}

/// One inbound message from the remote channel
///
/// Every field is optional; unrecognized fields are ignored so a message
/// carrying an unexpected shape never aborts the session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Partial transcription of the model's audio output
    #[serde(default)]
    pub output_transcription: Option<Transcription>,

    /// Inline synthesized audio (24kHz mono PCM, text-encoded)
    #[serde(default)]
    pub audio: Option<AudioChunk>,

    /// The current conversational turn is complete
    #[serde(default)]
    pub turn_complete: bool,

    /// The user started speaking over the assistant (barge-in)
    #[serde(default)]
    pub interrupted: bool,
}

/// Transcript fragment payload
#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    /// Fragment text
    pub text: String,
}

/// Lifecycle events delivered by an open live channel
#[derive(Debug)]
pub enum LiveEvent {
    /// An inbound server message
    Message(ServerMessage),
    /// Fatal protocol or transport failure
    Error(String),
    /// The remote closed the connection
    Closed,
}

/// Send half of an open live channel
#[async_trait]
pub trait LiveChannel: Send {
    /// Push one outbound audio chunk
    ///
    /// # Errors
    ///
    /// Returns error if the channel is no longer writable
    async fn send_realtime_input(&mut self, chunk: AudioChunk) -> Result<()>;

    /// Terminate the connection
    ///
    /// # Errors
    ///
    /// Returns error if the close handshake fails
    async fn close(&mut self) -> Result<()>;
}

/// Opens live channels
#[async_trait]
pub trait LiveConnector {
    /// Channel type produced on a successful handshake
    type Channel: LiveChannel;

    /// Perform the handshake; resolving `Ok` means the channel is open
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connect`] if the handshake fails
    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<(Self::Channel, mpsc::Receiver<LiveEvent>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_ignores_unknown_fields() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{
                "outputTranscription": { "text": "hello" },
                "turnComplete": true,
                "usageMetadata": { "tokens": 42 }
            }"#,
        )
        .unwrap();

        assert_eq!(msg.output_transcription.unwrap().text, "hello");
        assert!(msg.turn_complete);
        assert!(!msg.interrupted);
        assert!(msg.audio.is_none());
    }

    #[test]
    fn empty_message_is_a_no_op_shape() {
        let msg: ServerMessage = serde_json::from_str("{}").unwrap();
        assert!(msg.output_transcription.is_none());
        assert!(!msg.turn_complete);
        assert!(!msg.interrupted);
    }
}
