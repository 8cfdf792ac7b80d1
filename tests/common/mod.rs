//! Shared test doubles for the voice pipeline
//!
//! Hardware-free stand-ins for the audio devices and the remote channel so
//! the session lifecycle and playback scheduling can be driven
//! deterministically.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use agrivoice::voice::capture::CaptureSource;
use agrivoice::voice::channel::{ConnectParams, LiveChannel, LiveConnector, LiveEvent};
use agrivoice::voice::playback::{AudioOut, PlaybackClock, SourceId};
use agrivoice::voice::session::AudioDevices;
use agrivoice::voice::AudioChunk;
use agrivoice::{Error, Result};

/// Settable playback clock
#[derive(Clone, Default)]
pub struct ManualClock {
    time: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secs: f64) {
        *self.time.lock().unwrap() = secs;
    }
}

impl PlaybackClock for ManualClock {
    fn now(&self) -> f64 {
        *self.time.lock().unwrap()
    }
}

#[derive(Default)]
pub struct SinkState {
    pub begun: Vec<(Vec<f32>, f64)>,
    pub halted: Vec<SourceId>,
    pub finished: HashSet<SourceId>,
    pub next_id: SourceId,
    pub fail_begin: bool,
}

/// Output sink that records every call instead of playing audio
#[derive(Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_begin(&self) {
        self.state.lock().unwrap().fail_begin = true;
    }

    pub fn finish(&self, id: SourceId) {
        self.state.lock().unwrap().finished.insert(id);
    }

    pub fn begun(&self) -> Vec<(Vec<f32>, f64)> {
        self.state.lock().unwrap().begun.clone()
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.state
            .lock()
            .unwrap()
            .begun
            .iter()
            .map(|(_, start)| *start)
            .collect()
    }

    pub fn halted(&self) -> Vec<SourceId> {
        self.state.lock().unwrap().halted.clone()
    }
}

impl AudioOut for RecordingSink {
    fn begin(&mut self, samples: Vec<f32>, start_time: f64) -> Result<SourceId> {
        let mut state = self.state.lock().unwrap();
        if state.fail_begin {
            state.fail_begin = false;
            return Err(Error::Device("sink rejected buffer".to_string()));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.begun.push((samples, start_time));
        Ok(id)
    }

    fn halt(&mut self, id: SourceId) {
        self.state.lock().unwrap().halted.push(id);
    }

    fn is_finished(&self, id: SourceId) -> bool {
        self.state.lock().unwrap().finished.contains(&id)
    }
}

#[derive(Default)]
pub struct CaptureState {
    pub attach_count: usize,
    pub detach_count: usize,
    pub fail_attach: bool,
    pub tx: Option<mpsc::Sender<AudioChunk>>,
}

/// Capture source that hands the frame sender back to the test
#[derive(Clone, Default)]
pub struct FakeCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl FakeCapture {
    pub fn fail_attach(&self) {
        self.state.lock().unwrap().fail_attach = true;
    }

    pub fn attach_count(&self) -> usize {
        self.state.lock().unwrap().attach_count
    }

    pub fn detach_count(&self) -> usize {
        self.state.lock().unwrap().detach_count
    }

    /// Sender wired up by the session, for injecting capture frames
    pub fn frame_sender(&self) -> Option<mpsc::Sender<AudioChunk>> {
        self.state.lock().unwrap().tx.clone()
    }
}

impl CaptureSource for FakeCapture {
    fn attach(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_attach {
            return Err(Error::Device("capture attach refused".to_string()));
        }
        state.attach_count += 1;
        state.tx = Some(tx);
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.detach_count += 1;
        state.tx = None;
    }

    fn is_attached(&self) -> bool {
        self.state.lock().unwrap().tx.is_some()
    }
}

/// Device factory over the fakes, with failure injection
#[derive(Default)]
pub struct FakeDevices {
    pub capture: FakeCapture,
    pub sink: RecordingSink,
    pub clock: ManualClock,
    pub fail_capture_open: bool,
    pub fail_playback_open: bool,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioDevices for FakeDevices {
    type Capture = FakeCapture;
    type Out = RecordingSink;
    type Clock = ManualClock;

    fn open_capture(&mut self) -> Result<Self::Capture> {
        if self.fail_capture_open {
            return Err(Error::Device("no input device".to_string()));
        }
        Ok(self.capture.clone())
    }

    fn open_playback(&mut self) -> Result<(Self::Out, Self::Clock)> {
        if self.fail_playback_open {
            return Err(Error::Device("no output device".to_string()));
        }
        Ok((self.sink.clone(), self.clock.clone()))
    }
}

#[derive(Default)]
pub struct ChannelState {
    pub sent: Vec<AudioChunk>,
    pub close_count: usize,
    pub fail_send: bool,
}

/// Shared view into a [`MockChannel`], held by the test
#[derive(Clone, Default)]
pub struct ChannelProbe {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelProbe {
    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_send = true;
    }
}

/// Channel recording everything the session sends
pub struct MockChannel {
    probe: ChannelProbe,
}

#[async_trait]
impl LiveChannel for MockChannel {
    async fn send_realtime_input(&mut self, chunk: AudioChunk) -> Result<()> {
        let mut state = self.probe.state.lock().unwrap();
        if state.fail_send {
            return Err(Error::Protocol("channel not writable".to_string()));
        }
        state.sent.push(chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.state.lock().unwrap().close_count += 1;
        Ok(())
    }
}

/// Connector yielding [`MockChannel`]s; the test keeps the event sender
#[derive(Default)]
pub struct MockConnector {
    probe: ChannelProbe,
    fail_connect: bool,
    event_tx_slot: Arc<Mutex<Option<mpsc::Sender<LiveEvent>>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }

    pub fn probe(&self) -> ChannelProbe {
        self.probe.clone()
    }

    /// Sender for the event stream handed to the session on connect
    pub fn event_sender(&self) -> mpsc::Sender<LiveEvent> {
        self.event_tx_slot
            .lock()
            .unwrap()
            .clone()
            .expect("connect() has not been called")
    }

    /// Drop the test's copy of the event sender, closing the stream
    pub fn drop_event_sender(&self) {
        *self.event_tx_slot.lock().unwrap() = None;
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    type Channel = MockChannel;

    async fn connect(
        &self,
        _params: ConnectParams,
    ) -> Result<(Self::Channel, mpsc::Receiver<LiveEvent>)> {
        if self.fail_connect {
            return Err(Error::Connect("handshake refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(32);
        *self.event_tx_slot.lock().unwrap() = Some(tx);

        Ok((
            MockChannel {
                probe: self.probe.clone(),
            },
            rx,
        ))
    }
}
