//! Microphone capture pipeline
//!
//! Windows the live input stream into fixed-size frames, encodes each frame
//! through the PCM codec, and forwards chunks in capture order. The outbound
//! buffer is small and fixed; frames that don't fit are discarded rather
//! than queued, because stale audio is worse than dropped audio.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::voice::codec::{AudioChunk, INPUT_SAMPLE_RATE};
use crate::{Error, Result};

/// Fixed capture window: non-overlapping frames of this many samples
pub const FRAME_SAMPLES: usize = 4096;

/// Outbound frames buffered between the capture callback and the session
/// loop (~2s of audio at 16kHz)
pub const OUTBOUND_BUFFER_FRAMES: usize = 8;

/// A source of outbound audio chunks
pub trait CaptureSource {
    /// Start streaming frames into `tx`
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream cannot be started
    fn attach(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<()>;

    /// Stop streaming and release the stream
    fn detach(&mut self);

    /// Whether a stream is currently attached
    fn is_attached(&self) -> bool;
}

/// Windows raw samples into fixed-size frames and forwards them in order
///
/// Forwarding never waits: a frame that doesn't fit in the outbound buffer
/// is dropped, so a stalled session loop receives fresh audio when it
/// recovers instead of a backlog of stale frames.
pub struct FrameWindow {
    tx: mpsc::Sender<AudioChunk>,
    pending: Vec<f32>,
    dropped: u64,
}

impl FrameWindow {
    /// Create a window forwarding into `tx`
    #[must_use]
    pub fn new(tx: mpsc::Sender<AudioChunk>) -> Self {
        Self {
            tx,
            pending: Vec::with_capacity(FRAME_SAMPLES * 2),
            dropped: 0,
        }
    }

    /// Absorb raw samples, forwarding each completed frame
    pub fn extend(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            match self.tx.try_send(AudioChunk::from_samples(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    tracing::trace!(dropped = self.dropped, "outbound buffer full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    // Receiver gone means the session left Active
                    self.pending.clear();
                    return;
                }
            }
        }
    }

    /// Frames discarded because the outbound buffer was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Captures 16kHz mono audio from the default input device
pub struct MicSource {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl MicSource {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device or config exists
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(INPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(INPUT_SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Device("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(INPUT_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = INPUT_SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl CaptureSource for MicSource {
    fn attach(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let config = self.config.clone();
        let mut window = FrameWindow::new(tx);

        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    window.extend(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(frame_samples = FRAME_SAMPLES, "capture pipeline attached");
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture pipeline detached");
        }
    }

    fn is_attached(&self) -> bool {
        self.stream.is_some()
    }
}
