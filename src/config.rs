//! Configuration management for the AgriVoice gateway
//!
//! Layered loading: environment variables override an optional TOML file
//! (`~/.config/agrivoice/config.toml`), which overrides built-in defaults.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::Result;

/// Default live conversational model
const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default chat/grounded-answer model
const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";

/// Default generative-language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Voice persona for the live session: short, hands-free answers
const VOICE_INSTRUCTION: &str = "You are AgriVoice. Provide quick, helpful \
audio advice for farmers who are busy working in the field. Keep responses \
concise and focused.";

/// System instruction for grounded text answers
const CHAT_INSTRUCTION: &str = "You are AgriVoice, a highly knowledgeable \
agricultural assistant. Use real-time internet data to provide specific, \
actionable advice for farmers. Focus on local weather, current commodity \
prices, sustainable farming practices, and pest management. Always maintain \
a helpful, professional, and encouraging tone. If asked about prices, \
provide current market data if available.";

/// AgriVoice gateway configuration
#[derive(Debug)]
pub struct Config {
    /// API key for the hosted generative-language service
    pub api_key: Option<SecretString>,

    /// Generative-language API base URL
    pub base_url: String,

    /// Chat/grounding model identifier
    pub chat_model: String,

    /// Chat system instruction
    pub chat_instruction: String,

    /// Voice session configuration
    pub voice: VoiceConfig,
}

/// Voice session configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Live conversational model identifier
    pub live_model: String,

    /// Voice persona system instruction
    pub system_instruction: String,
}

/// Top-level TOML configuration file schema
///
/// All fields are optional — the file is a partial overlay on top of defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api_key: Option<String>,

    #[serde(default)]
    base_url: Option<String>,

    #[serde(default)]
    chat: ChatFileConfig,

    #[serde(default)]
    voice: VoiceFileConfig,
}

/// Chat assistant configuration
#[derive(Debug, Default, Deserialize)]
struct ChatFileConfig {
    /// Model identifier for grounded text answers
    model: Option<String>,

    /// System instruction override
    instruction: Option<String>,
}

/// Voice session configuration
#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    /// Live conversational model identifier
    model: Option<String>,

    /// Voice persona instruction override
    instruction: Option<String>,
}

impl Config {
    /// Load configuration (env > toml file > defaults)
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed
    pub fn load() -> Result<Self> {
        let fc = load_config_file()?;

        let api_key = std::env::var("AGRIVOICE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .ok()
            .or(fc.api_key)
            .map(SecretString::from);

        let base_url = std::env::var("AGRIVOICE_BASE_URL")
            .ok()
            .or(fc.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let chat_model = std::env::var("AGRIVOICE_CHAT_MODEL")
            .ok()
            .or(fc.chat.model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());

        let chat_instruction = fc
            .chat
            .instruction
            .unwrap_or_else(|| CHAT_INSTRUCTION.to_string());

        let voice = VoiceConfig {
            live_model: std::env::var("AGRIVOICE_LIVE_MODEL")
                .ok()
                .or(fc.voice.model)
                .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            system_instruction: fc
                .voice
                .instruction
                .unwrap_or_else(|| VOICE_INSTRUCTION.to_string()),
        };

        Ok(Self {
            api_key,
            base_url,
            chat_model,
            chat_instruction,
            voice,
        })
    }
}

/// Locate the config file: `~/.config/agrivoice/config.toml`
fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("agrivoice").join("config.toml"))
}

/// Load the optional TOML config file
fn load_config_file() -> Result<ConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let parsed = toml::from_str(&content)?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(parsed)
}
