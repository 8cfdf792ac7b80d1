//! Real-time voice pipeline
//!
//! Microphone capture is windowed into PCM chunks and streamed to a remote
//! conversational endpoint; synthesized audio and transcript fragments
//! stream back and are scheduled for gapless playback with barge-in support.
//! The remote transport lives behind the `channel` traits.

pub mod capture;
pub mod channel;
pub mod codec;
pub mod loopback;
pub mod playback;
pub mod session;
pub mod transcript;

pub use capture::{CaptureSource, FRAME_SAMPLES, FrameWindow, MicSource, OUTBOUND_BUFFER_FRAMES};
pub use channel::{ConnectParams, LiveChannel, LiveConnector, LiveEvent, ServerMessage};
pub use codec::{AudioChunk, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, samples_to_wav};
pub use loopback::LoopbackConnector;
pub use playback::{AudioOut, PlaybackClock, PlaybackScheduler, SourceId};
pub use session::{AudioDevices, MicAndSpeaker, MicSession, SessionState, VoiceSession};
pub use transcript::TranscriptBuffer;
