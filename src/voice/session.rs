//! Live voice session lifecycle
//!
//! A [`VoiceSession`] owns one remote conversational connection and both
//! audio device contexts. State moves monotonically along
//! Idle -> Connecting -> Active -> {Closed, Error}; a connect failure
//! short-circuits to Error. Once Closed or Error the session's connection is
//! never reused — `stop()` releases everything and returns the slot to Idle
//! so the caller can start a fresh session.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::voice::capture::{CaptureSource, MicSource, OUTBOUND_BUFFER_FRAMES};
use crate::voice::channel::{ConnectParams, LiveChannel, LiveConnector, LiveEvent, ServerMessage};
use crate::voice::codec::{self, OUTPUT_SAMPLE_RATE};
use crate::voice::playback::{AudioOut, DeviceOut, MixerClock, PlaybackClock, PlaybackScheduler};
use crate::voice::transcript::TranscriptBuffer;
use crate::{Error, Result};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Idle,
    /// Remote handshake in flight
    Connecting,
    /// Bidirectional streaming established
    Active,
    /// Handshake or protocol failure; resources released
    Error,
    /// Clean shutdown by either side; resources released
    Closed,
}

/// Factory for the pair of audio device contexts a session owns
pub trait AudioDevices {
    /// Capture-side context (16kHz input)
    type Capture: CaptureSource;
    /// Playback-side sink (24kHz output)
    type Out: AudioOut;
    /// Clock shared with the playback sink
    type Clock: PlaybackClock;

    /// Acquire the capture device
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the microphone cannot be opened
    fn open_capture(&mut self) -> Result<Self::Capture>;

    /// Acquire the playback device and its clock
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the output device cannot be opened
    fn open_playback(&mut self) -> Result<(Self::Out, Self::Clock)>;
}

/// Production devices: default microphone and speaker via cpal
pub struct MicAndSpeaker;

impl AudioDevices for MicAndSpeaker {
    type Capture = MicSource;
    type Out = DeviceOut;
    type Clock = MixerClock;

    fn open_capture(&mut self) -> Result<Self::Capture> {
        MicSource::open()
    }

    fn open_playback(&mut self) -> Result<(Self::Out, Self::Clock)> {
        DeviceOut::open()
    }
}

/// The owned audio contexts, held only while a session is live
struct SessionAudio<D: AudioDevices> {
    capture: D::Capture,
    scheduler: PlaybackScheduler<D::Out, D::Clock>,
}

/// One live voice session
pub struct VoiceSession<D: AudioDevices, Ch: LiveChannel> {
    id: Uuid,
    state: SessionState,
    devices: D,
    audio: Option<SessionAudio<D>>,
    channel: Option<Ch>,
    events: Option<mpsc::Receiver<LiveEvent>>,
    outbound: Option<mpsc::Receiver<codec::AudioChunk>>,
    transcript: TranscriptBuffer,
}

/// Production session: microphone in, speaker out
pub type MicSession<Ch> = VoiceSession<MicAndSpeaker, Ch>;

impl<D: AudioDevices, Ch: LiveChannel> VoiceSession<D, Ch> {
    /// Create an idle session over the given device factory
    pub fn new(devices: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            devices,
            audio: None,
            channel: None,
            events: None,
            outbound: None,
            transcript: TranscriptBuffer::new(),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether bidirectional streaming is established
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// In-progress transcript of the assistant's current turn
    #[must_use]
    pub fn transcript(&self) -> &str {
        self.transcript.text()
    }

    /// Open the remote channel and wire up the audio pipeline
    ///
    /// Valid only from `Idle`. Acquires both device contexts, performs the
    /// handshake, and attaches capture only after the channel confirms open
    /// so no audio is sent into a half-open connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the session is not idle,
    /// [`Error::Device`] or [`Error::Connect`] on acquisition/handshake
    /// failure — in which case the session is left in `Error` with every
    /// partially acquired resource released.
    pub async fn start<Conn>(&mut self, connector: &Conn, params: ConnectParams) -> Result<()>
    where
        Conn: LiveConnector<Channel = Ch> + Sync,
    {
        if self.state != SessionState::Idle {
            return Err(Error::Session(format!(
                "start() requires an idle session (state: {:?})",
                self.state
            )));
        }

        self.state = SessionState::Connecting;
        tracing::info!(session = %self.id, model = %params.model, "opening live channel");

        let mut audio = match self.open_audio() {
            Ok(audio) => audio,
            Err(e) => {
                self.state = SessionState::Error;
                return Err(e);
            }
        };

        let (channel, events) = match connector.connect(params).await {
            Ok(open) => open,
            Err(e) => {
                // Devices were acquired but the handshake failed; audio is
                // dropped here, capture was never attached
                drop(audio);
                self.state = SessionState::Error;
                tracing::error!(session = %self.id, error = %e, "live connect failed");
                return Err(e);
            }
        };

        // Small bounded buffer: capture drops frames that don't fit rather
        // than letting a stalled transport accumulate stale audio
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_FRAMES);
        if let Err(e) = audio.capture.attach(tx) {
            drop(audio);
            let mut channel = channel;
            if let Err(close_err) = channel.close().await {
                tracing::debug!(error = %close_err, "channel close after attach failure");
            }
            self.state = SessionState::Error;
            return Err(e);
        }

        self.audio = Some(audio);
        self.channel = Some(channel);
        self.events = Some(events);
        self.outbound = Some(rx);
        self.state = SessionState::Active;

        tracing::info!(session = %self.id, "live session active");
        Ok(())
    }

    /// Acquire both audio contexts; a playback failure releases the
    /// already-acquired capture device
    fn open_audio(&mut self) -> Result<SessionAudio<D>> {
        let capture = self.devices.open_capture()?;
        let (out, clock) = self.devices.open_playback()?;
        Ok(SessionAudio {
            capture,
            scheduler: PlaybackScheduler::new(out, clock),
        })
    }

    /// Pump outbound frames and inbound events until the session leaves
    /// `Active` or `shutdown` fires
    ///
    /// Outbound chunks are forwarded one at a time in capture order; a
    /// failed send is logged and the frame dropped, never retried.
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) -> SessionState {
        let (Some(mut events), Some(mut outbound)) = (self.events.take(), self.outbound.take())
        else {
            return self.state;
        };

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                        if self.state != SessionState::Active {
                            break;
                        }
                    }
                    None => {
                        // Event stream dropped without a close notification
                        self.teardown().await;
                        self.state = SessionState::Closed;
                        break;
                    }
                },
                Some(chunk) = outbound.recv() => {
                    if let Some(channel) = self.channel.as_mut() {
                        if let Err(e) = channel.send_realtime_input(chunk).await {
                            tracing::warn!(session = %self.id, error = %e, "dropped outbound frame");
                        }
                    }
                },
                // A dropped sender is not a shutdown request; the pattern
                // disables this arm when the stream yields None
                Some(()) = shutdown.recv() => {
                    tracing::info!(session = %self.id, "shutdown requested");
                    self.stop().await;
                    break;
                },
            }
        }

        self.state
    }

    /// Route one channel lifecycle event
    pub async fn handle_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Message(msg) => self.handle_message(&msg),
            LiveEvent::Error(e) => {
                tracing::error!(session = %self.id, error = %e, "live channel error");
                self.teardown().await;
                self.state = SessionState::Error;
            }
            LiveEvent::Closed => {
                tracing::info!(session = %self.id, "live channel closed by remote");
                self.teardown().await;
                self.state = SessionState::Closed;
            }
        }
    }

    /// Route one inbound server message (meaningful only while `Active`)
    pub fn handle_message(&mut self, msg: &ServerMessage) {
        if self.state != SessionState::Active {
            return;
        }

        if let Some(transcription) = &msg.output_transcription {
            self.transcript.push(&transcription.text);
        }

        if msg.turn_complete {
            self.transcript.clear();
        }

        if let Some(audio) = &msg.audio {
            match codec::decode_audio_payload(&audio.data) {
                Ok(samples) if !samples.is_empty() => {
                    let duration = codec::duration_secs(samples.len(), OUTPUT_SAMPLE_RATE);
                    if let Some(ctx) = self.audio.as_mut() {
                        if let Err(e) = ctx.scheduler.schedule(samples, duration) {
                            tracing::warn!(session = %self.id, error = %e, "failed to schedule chunk");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Malformed chunk: drop it and keep the session alive
                    tracing::warn!(session = %self.id, error = %e, "dropping malformed audio chunk");
                }
            }
        }

        if msg.interrupted {
            if let Some(ctx) = self.audio.as_mut() {
                ctx.scheduler.interrupt();
            }
        }
    }

    /// Stop the session and release every resource
    ///
    /// Unconditional: tolerates being called from `Connecting`, `Active`, or
    /// `Error`, including with only partially acquired resources. Ends in
    /// `Idle` (a session that already reached `Closed` stays inert).
    pub async fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }

        self.teardown().await;

        if self.state != SessionState::Closed {
            self.state = SessionState::Idle;
        }
        tracing::info!(session = %self.id, state = ?self.state, "session stopped");
    }

    /// Release the channel and both device contexts; halts playback and
    /// resets the cursor
    async fn teardown(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.capture.detach();
            audio.scheduler.interrupt();
        }

        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                tracing::debug!(session = %self.id, error = %e, "channel close failed");
            }
        }

        self.events = None;
        self.outbound = None;
    }

    /// Active playback sources (scheduled, not yet finished)
    #[must_use]
    pub fn active_playback_sources(&self) -> usize {
        self.audio
            .as_ref()
            .map_or(0, |ctx| ctx.scheduler.active_sources())
    }

    /// Playback cursor position on the shared clock
    #[must_use]
    pub fn playback_cursor(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |ctx| ctx.scheduler.cursor())
    }
}
