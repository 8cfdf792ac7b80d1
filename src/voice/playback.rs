//! Gapless playback scheduling on a shared audio clock
//!
//! [`PlaybackScheduler`] owns the playback cursor and the set of active
//! sources; the device sink mixes scheduled buffers into the output stream
//! at their assigned start times. Interruption (barge-in) halts everything
//! immediately and resets the cursor.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use crate::voice::codec::OUTPUT_SAMPLE_RATE;
use crate::{Error, Result};

/// Handle to one scheduled, not-yet-finished playback source
pub type SourceId = u64;

/// Monotonic time source on the playback clock, in seconds
pub trait PlaybackClock {
    /// Current playback time
    fn now(&self) -> f64;
}

/// Output sink that plays buffers at explicit start times on the shared clock
pub trait AudioOut {
    /// Register a buffer to start playing at `start_time`
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the buffer
    fn begin(&mut self, samples: Vec<f32>, start_time: f64) -> Result<SourceId>;

    /// Stop a source immediately
    fn halt(&mut self, id: SourceId);

    /// Whether a source has finished playing naturally
    fn is_finished(&self, id: SourceId) -> bool;
}

/// Schedules decoded audio chunks for gapless, ordered output
///
/// Start times form a non-decreasing sequence with
/// `start_i + duration_i <= start_{i+1}`: no two buffers ever overlap,
/// though gaps appear when upstream delivery lags behind real time.
pub struct PlaybackScheduler<S: AudioOut, C: PlaybackClock> {
    sink: S,
    clock: C,
    next_start_time: f64,
    active: Vec<SourceId>,
}

impl<S: AudioOut, C: PlaybackClock> PlaybackScheduler<S, C> {
    /// Create a scheduler over a sink and its clock
    pub fn new(sink: S, clock: C) -> Self {
        Self {
            sink,
            clock,
            next_start_time: 0.0,
            active: Vec::new(),
        }
    }

    /// Enqueue a buffer of `duration` seconds directly after the cursor
    ///
    /// # Errors
    ///
    /// Returns error if the sink rejects the buffer
    pub fn schedule(&mut self, samples: Vec<f32>, duration: f64) -> Result<()> {
        self.reap_finished();

        let start_time = self.next_start_time.max(self.clock.now());
        let id = self.sink.begin(samples, start_time)?;
        self.active.push(id);
        self.next_start_time = start_time + duration;

        tracing::trace!(id, start_time, duration, "scheduled playback chunk");
        Ok(())
    }

    /// Stop all active sources and reset the cursor (barge-in)
    ///
    /// The next scheduled buffer starts at the clock's current time.
    pub fn interrupt(&mut self) {
        let halted = self.active.len();
        for id in self.active.drain(..) {
            self.sink.halt(id);
        }
        self.next_start_time = 0.0;

        if halted > 0 {
            tracing::debug!(halted, "playback interrupted");
        }
    }

    /// Drop handles whose buffers finished playing naturally
    fn reap_finished(&mut self) {
        let sink = &self.sink;
        self.active.retain(|id| !sink.is_finished(*id));
    }

    /// Number of scheduled, unfinished sources
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.active
            .iter()
            .filter(|id| !self.sink.is_finished(**id))
            .count()
    }

    /// Where the next scheduled chunk will begin, on the playback clock
    #[must_use]
    pub fn cursor(&self) -> f64 {
        self.next_start_time
    }
}

/// Shared mixer state between the scheduler thread and the output callback
struct MixerState {
    /// Frames rendered since the stream started; the shared audio clock
    frames_rendered: u64,
    next_id: SourceId,
    sources: Vec<MixerSource>,
}

struct MixerSource {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
    cursor: usize,
    finished: bool,
}

/// Playback clock derived from frames actually rendered by the device
#[derive(Clone)]
pub struct MixerClock {
    state: Arc<Mutex<MixerState>>,
}

impl PlaybackClock for MixerClock {
    fn now(&self) -> f64 {
        self.state
            .lock()
            .map(|s| frames_to_secs(s.frames_rendered))
            .unwrap_or_default()
    }
}

/// cpal-backed output sink mixing scheduled buffers at 24kHz
pub struct DeviceOut {
    state: Arc<Mutex<MixerState>>,
    // Held for the lifetime of the sink; dropping releases the device
    _stream: Stream,
}

impl DeviceOut {
    /// Open the default output device and start the mixer stream
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device or config exists
    pub fn open() -> Result<(Self, MixerClock)> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Device("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(OUTPUT_SAMPLE_RATE))
            .config();
        let channels = config.channels as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = OUTPUT_SAMPLE_RATE,
            channels = config.channels,
            "playback mixer initialized"
        );

        let state = Arc::new(Mutex::new(MixerState {
            frames_rendered: 0,
            next_id: 0,
            sources: Vec::new(),
        }));
        let callback_state = Arc::clone(&state);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut state) = callback_state.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let t = state.frames_rendered;
                        let mut value = 0.0f32;
                        for source in &mut state.sources {
                            if source.finished || source.start_frame > t {
                                continue;
                            }
                            value += source.samples[source.cursor];
                            source.cursor += 1;
                            if source.cursor == source.samples.len() {
                                source.finished = true;
                            }
                        }
                        for out in frame.iter_mut() {
                            *out = value;
                        }
                        state.frames_rendered += 1;
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        let clock = MixerClock {
            state: Arc::clone(&state),
        };

        Ok((
            Self {
                state,
                _stream: stream,
            },
            clock,
        ))
    }
}

impl AudioOut for DeviceOut {
    fn begin(&mut self, samples: Vec<f32>, start_time: f64) -> Result<SourceId> {
        if samples.is_empty() {
            return Err(Error::Device("empty playback buffer".to_string()));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Device("mixer state poisoned".to_string()))?;

        // Bound memory: finished sources are only needed until reaped
        state.sources.retain(|s| !s.finished);

        let id = state.next_id;
        state.next_id += 1;
        state.sources.push(MixerSource {
            id,
            start_frame: secs_to_frames(start_time),
            samples,
            cursor: 0,
            finished: false,
        });

        Ok(id)
    }

    fn halt(&mut self, id: SourceId) {
        if let Ok(mut state) = self.state.lock() {
            state.sources.retain(|s| s.id != id);
        }
    }

    fn is_finished(&self, id: SourceId) -> bool {
        self.state
            .lock()
            .map(|s| s.sources.iter().find(|s| s.id == id).is_none_or(|s| s.finished))
            .unwrap_or(true)
    }
}

#[allow(clippy::cast_precision_loss)]
fn frames_to_secs(frames: u64) -> f64 {
    frames as f64 / f64::from(OUTPUT_SAMPLE_RATE)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_frames(secs: f64) -> u64 {
    (secs.max(0.0) * f64::from(OUTPUT_SAMPLE_RATE)).round() as u64
}
