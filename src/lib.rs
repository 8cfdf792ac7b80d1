//! AgriVoice - field-ready assistant gateway for farmers
//!
//! This library provides the core functionality for the AgriVoice gateway:
//! - Real-time bidirectional voice sessions (capture, codec, playback)
//! - Grounded text answers with cited web sources
//! - Market insight summaries
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     CLI / UI                        │
//! │      voice  │  ask  │  market  │  diagnostics       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                AgriVoice Gateway                    │
//! │  Session  │  Capture  │  Codec  │  Playback         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        Hosted generative-language service           │
//! │      live voice channel  │  grounded answers        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod error;
pub mod voice;

pub use assistant::{Answer, Assistant, GroundingSource, Location};
pub use config::{Config, VoiceConfig};
pub use error::{Error, Result};
pub use voice::{
    AudioChunk, ConnectParams, LiveChannel, LiveConnector, LiveEvent, LoopbackConnector,
    MicSession, PlaybackScheduler, ServerMessage, SessionState, TranscriptBuffer, VoiceSession,
};
