//! Error types for the AgriVoice gateway

use thiserror::Error;

/// Result type alias for AgriVoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the AgriVoice gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote channel handshake failure
    #[error("connect error: {0}")]
    Connect(String),

    /// Microphone or playback device failure
    #[error("device error: {0}")]
    Device(String),

    /// Malformed PCM chunk (length not aligned to sample/channel stride)
    #[error("codec error: {0}")]
    Codec(String),

    /// Unexpected message shape from the remote channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Session lifecycle violation (e.g. start while not idle)
    #[error("session error: {0}")]
    Session(String),

    /// Text assistant endpoint error
    #[error("assistant error: {0}")]
    Assistant(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
