//! PCM codec: float samples <-> 16-bit little-endian PCM, plus the
//! text-safe transport encoding used for audio chunks on the wire

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sample rate for captured microphone audio (16kHz for speech)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio delivered by the remote model
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Format tag for outbound capture chunks
pub const PCM_INPUT_MIME: &str = "audio/pcm;rate=16000";

/// One unit of audio exchanged with the remote endpoint: text-encoded
/// PCM bytes plus a declared format tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Base64-encoded PCM16-LE bytes
    pub data: String,

    /// Declared format (e.g. `audio/pcm;rate=16000`)
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

impl AudioChunk {
    /// Build an outbound capture chunk from float samples
    #[must_use]
    pub fn from_samples(samples: &[f32]) -> Self {
        Self {
            data: encode_base64(&pcm16_from_f32(samples)),
            mime_type: PCM_INPUT_MIME.to_string(),
        }
    }
}

/// Convert float samples in `[-1, 1]` to 16-bit little-endian PCM bytes
///
/// Samples are scaled by 32768 and clamped to the i16 range, so +1.0 maps to
/// `i16::MAX` instead of wrapping. Output length is `2 * samples.len()`.
#[must_use]
pub fn pcm16_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian PCM bytes to per-channel float samples
///
/// # Errors
///
/// Returns [`Error::Codec`] if the byte length is odd, `channels` is zero,
/// or the sample count is not divisible by the channel count. Malformed
/// chunks are never silently truncated.
pub fn f32_from_pcm16(bytes: &[u8], channels: usize) -> Result<Vec<Vec<f32>>> {
    if channels == 0 {
        return Err(Error::Codec("channel count must be nonzero".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(Error::Codec(format!(
            "pcm16 payload length {} is not sample-aligned",
            bytes.len()
        )));
    }

    let sample_count = bytes.len() / 2;
    if sample_count % channels != 0 {
        return Err(Error::Codec(format!(
            "{sample_count} samples do not divide into {channels} channels"
        )));
    }

    let frame_count = sample_count / channels;
    let mut out = vec![Vec::with_capacity(frame_count); channels];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        out[i % channels].push(f32::from(value) / 32768.0);
    }

    Ok(out)
}

/// Decode an inbound mono audio payload into float samples
///
/// # Errors
///
/// Returns [`Error::Codec`] if the text encoding or the PCM framing is
/// malformed.
pub fn decode_audio_payload(data: &str) -> Result<Vec<f32>> {
    let bytes = decode_base64(data)?;
    let mut channels = f32_from_pcm16(&bytes, 1)?;
    Ok(channels.swap_remove(0))
}

/// Encode bytes with the text-safe transport encoding
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode the text-safe transport encoding back to bytes
///
/// # Errors
///
/// Returns [`Error::Codec`] if the input is not valid base64
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| Error::Codec(format!("invalid base64 payload: {e}")))
}

/// Duration in seconds of a mono sample buffer at the given rate
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / f64::from(sample_rate)
}

/// Convert f32 samples to WAV bytes (debug captures, `test-mic --save`)
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Codec(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Codec(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Codec(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
