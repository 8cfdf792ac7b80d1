//! In-process loopback channel
//!
//! Stands in for the remote voice service so the whole pipeline — capture,
//! codec, session loop, playback scheduling — can be exercised end to end
//! without network access (`agrivoice voice --echo`). Speaks a greeting tone
//! on connect and acknowledges received audio every few seconds.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::voice::channel::{
    ConnectParams, LiveChannel, LiveConnector, LiveEvent, ServerMessage, Transcription,
};
use crate::voice::codec::{self, OUTPUT_SAMPLE_RATE};

/// Acknowledge after this many received capture frames (~2.5s at 16kHz)
const ACK_EVERY_FRAMES: u64 = 10;

/// Connector producing [`LoopbackChannel`]s
pub struct LoopbackConnector;

/// Channel that answers locally instead of over the network
pub struct LoopbackChannel {
    events: mpsc::Sender<LiveEvent>,
    frames_received: u64,
}

#[async_trait]
impl LiveConnector for LoopbackConnector {
    type Channel = LoopbackChannel;

    async fn connect(
        &self,
        params: ConnectParams,
    ) -> Result<(Self::Channel, mpsc::Receiver<LiveEvent>)> {
        tracing::debug!(model = %params.model, "loopback channel opened");
        let (tx, rx) = mpsc::channel(32);

        // Greeting turn, delivered as soon as the session starts pumping
        for event in greeting_turn() {
            let _ = tx.send(event).await;
        }

        Ok((
            LoopbackChannel {
                events: tx,
                frames_received: 0,
            },
            rx,
        ))
    }
}

#[async_trait]
impl LiveChannel for LoopbackChannel {
    async fn send_realtime_input(&mut self, chunk: codec::AudioChunk) -> Result<()> {
        // Validate the frame the way a real endpoint would
        codec::decode_base64(&chunk.data)?;
        self.frames_received += 1;

        if self.frames_received % ACK_EVERY_FRAMES == 0 {
            for event in ack_turn(self.frames_received) {
                // The session loop drains these on the same task that is
                // calling us; never wait on a full buffer, drop the ack
                if self.events.try_send(event).is_err() {
                    tracing::trace!("event stream backed up, ack turn dropped");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!(frames = self.frames_received, "loopback channel closed");
        Ok(())
    }
}

/// Greeting: transcript fragments, a short tone, turn complete
fn greeting_turn() -> Vec<LiveEvent> {
    vec![
        transcript_fragment("Echo channel ready. "),
        transcript_fragment("Speak into your microphone."),
        audio_message(tone(660.0, 0.3)),
        turn_complete(),
    ]
}

/// Periodic acknowledgement while audio keeps arriving
fn ack_turn(frames: u64) -> Vec<LiveEvent> {
    vec![
        transcript_fragment(&format!("Received {frames} frames.")),
        audio_message(tone(440.0, 0.15)),
        turn_complete(),
    ]
}

fn transcript_fragment(text: &str) -> LiveEvent {
    LiveEvent::Message(ServerMessage {
        output_transcription: Some(Transcription {
            text: text.to_string(),
        }),
        ..ServerMessage::default()
    })
}

fn audio_message(samples: Vec<f32>) -> LiveEvent {
    LiveEvent::Message(ServerMessage {
        audio: Some(codec::AudioChunk {
            data: codec::encode_base64(&codec::pcm16_from_f32(&samples)),
            mime_type: format!("audio/pcm;rate={OUTPUT_SAMPLE_RATE}"),
        }),
        ..ServerMessage::default()
    })
}

fn turn_complete() -> LiveEvent {
    LiveEvent::Message(ServerMessage {
        turn_complete: true,
        ..ServerMessage::default()
    })
}

/// Sine tone at the playback sample rate
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tone(frequency: f32, duration_secs: f32) -> Vec<f32> {
    let num_samples = (OUTPUT_SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / OUTPUT_SAMPLE_RATE as f32;
            0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
