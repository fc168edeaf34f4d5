//! Session lifecycle and input dispatch
//!
//! `SessionManager` owns the one live `Session` and every per-session
//! component. It lives on the dispatch thread and handles one
//! `SessionInput` at a time, so none of its state needs locking. The UI only
//! sees what it publishes into `SharedSessionState`.

use crate::audio::device::{AudioBackend, CaptureFormat, CaptureStream, PlaybackEvent, PlaybackSink};
use crate::codec::{AudioCodec, Pcm16Codec};
use crate::integration::config::SessionConfig;
use crate::lead::LeadRecord;
use crate::live::{ChannelEvent, LiveChannel, LiveTransport, ToolInvocation};
use crate::messages::Message;
use crate::session::capture::CapturePipeline;
use crate::session::gate::NoiseGate;
use crate::session::monitor::VolumeMonitor;
use crate::session::playback::PlaybackScheduler;
use crate::session::tools::ToolCallBridge;
use crate::session::transcript::TranscriptAssembler;
use crate::state::{ConnectionState, SessionCommand, SessionEvent, SharedSessionState};
use crate::utils::{CaptureSender, ChannelEventSender, PlaybackNotifier, SessionInput};
use crate::{ParleyError, Result};
use chrono::Utc;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const SESSION_OPENED_NOTE: &str = "Live session established. Service agent is online.";
pub const SESSION_CLOSED_NOTE: &str = "Live session closed.";

/// Resources held by one connection attempt
pub struct Session {
    generation: u64,
    channel: Box<dyn LiveChannel>,
    capture: Box<dyn CaptureStream>,
    sink: Box<dyn PlaybackSink>,
    connect_deadline: Option<Instant>,
}

impl Session {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Whether the dispatch loop keeps running after an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct SessionManager {
    config: SessionConfig,
    backend: Box<dyn AudioBackend>,
    transport: Box<dyn LiveTransport>,
    input_tx: Sender<SessionInput>,
    shared: SharedSessionState,
    events: Sender<SessionEvent>,

    session: Option<Session>,
    generation: u64,

    capture: CapturePipeline,
    playback: PlaybackScheduler,
    transcript: TranscriptAssembler,
    tools: ToolCallBridge,
    monitor: VolumeMonitor,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        transport: Box<dyn LiveTransport>,
        input_tx: Sender<SessionInput>,
        shared: SharedSessionState,
        events: Sender<SessionEvent>,
    ) -> Self {
        let codec: Arc<dyn AudioCodec> = Arc::new(Pcm16Codec::new(
            config.input_sample_rate,
            config.output_sample_rate,
        ));
        let gate = NoiseGate::new(shared.sensitivity(), config.gate_constant);

        Self {
            capture: CapturePipeline::new(gate, Arc::clone(&codec), config.max_device_faults),
            playback: PlaybackScheduler::new(codec),
            transcript: TranscriptAssembler::new(),
            tools: ToolCallBridge::new(),
            monitor: VolumeMonitor::new(),
            config,
            backend,
            transport,
            input_tx,
            shared,
            events,
            session: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.connection_state()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle one queued input
    pub fn handle(&mut self, input: SessionInput) -> Flow {
        match input {
            SessionInput::Command(command) => return self.handle_command(command),
            SessionInput::Capture { generation, block } => {
                if self.is_current(generation) {
                    self.handle_capture(block);
                }
            }
            SessionInput::CaptureFault {
                generation,
                message,
            } => {
                if self.is_current(generation) {
                    self.handle_capture_fault(message);
                }
            }
            SessionInput::Channel { generation, event } => {
                if self.is_current(generation) {
                    self.handle_channel(event);
                } else {
                    debug!("Dropping channel event from stale session {}", generation);
                }
            }
            SessionInput::Playback { generation, event } => {
                if self.is_current(generation) {
                    self.handle_playback(event);
                }
            }
        }
        Flow::Continue
    }

    /// Periodic poll: connect timeout and the volume monitor
    pub fn tick(&mut self, now: Instant) {
        let timed_out = self
            .session
            .as_ref()
            .and_then(|s| s.connect_deadline)
            .map(|deadline| now >= deadline)
            .unwrap_or(false);

        if timed_out && self.state() == ConnectionState::Connecting {
            self.fail(ParleyError::ChannelError("connection timed out".into()));
            return;
        }

        let rms = match &self.session {
            Some(session) => session.sink.output_rms(),
            None => 0.0,
        };
        let previous = self.monitor.last();
        let volume = self.monitor.sample(self.playback.is_speaking(), rms);
        if volume != previous {
            self.shared.update(|s| s.volume = volume);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .map(|s| s.generation == generation)
            .unwrap_or(false)
    }

    fn handle_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Connect { reply } => {
                let result = self.connect();
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            SessionCommand::SetSensitivity(value) => {
                self.capture.set_sensitivity(value);
                let applied = self.capture.gate().sensitivity();
                self.shared.update(|s| s.sensitivity = applied);
                debug!("Sensitivity set to {:.2}", applied);
            }
            SessionCommand::ClearHistory => {
                self.shared.update(|s| {
                    s.messages.clear();
                    s.lead = LeadRecord::new();
                });
                self.emit(SessionEvent::LeadUpdated(LeadRecord::new()));
                info!("Cleared message history and lead record");
            }
            SessionCommand::Sync { reply } => {
                let _ = reply.send(());
            }
            SessionCommand::Shutdown => {
                info!("Shutting down session manager");
                self.teardown();
                self.set_state(ConnectionState::Idle);
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Open devices and start negotiating a session
    ///
    /// Returns once the attempt is under way; the state moves to `Open` when
    /// the remote side reports it.
    pub fn connect(&mut self) -> Result<()> {
        if !self.state().can_connect() {
            debug!("Connect ignored, session already {}", self.state());
            return Ok(());
        }

        if let Err(e) = self.config.validate() {
            self.report_error(&e);
            self.set_state(ConnectionState::Errored);
            return Err(e);
        }

        self.generation += 1;
        let generation = self.generation;
        self.shared.update(|s| s.error = None);
        self.set_state(ConnectionState::Connecting);

        match self.open_session(generation) {
            Ok(session) => {
                self.session = Some(session);
                info!("Session {} connecting", generation);
                Ok(())
            }
            Err(e) => {
                self.report_error(&e);
                self.set_state(ConnectionState::Errored);
                Err(e)
            }
        }
    }

    fn open_session(&mut self, generation: u64) -> Result<Session> {
        let mut sink = self
            .backend
            .open_output(PlaybackNotifier::new(self.input_tx.clone(), generation))?;

        let format = CaptureFormat {
            sample_rate: self.config.input_sample_rate,
            block_size: self.config.block_size,
        };
        let mut capture = match self
            .backend
            .open_input(format, CaptureSender::new(self.input_tx.clone(), generation))
        {
            Ok(capture) => capture,
            Err(e) => {
                sink.close();
                return Err(e);
            }
        };

        let setup = self.config.live_setup();
        let channel = match self
            .transport
            .connect(&setup, ChannelEventSender::new(self.input_tx.clone(), generation))
        {
            Ok(channel) => channel,
            Err(e) => {
                capture.stop();
                sink.close();
                return Err(e);
            }
        };

        self.playback.reset();
        self.capture.reset();
        self.transcript.clear();
        self.monitor.reset();

        Ok(Session {
            generation,
            channel,
            capture,
            sink,
            connect_deadline: self
                .config
                .connect_timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        })
    }

    /// Tear everything down and return to idle; safe from any state
    pub fn disconnect(&mut self) {
        if self.session.is_some() {
            info!("Disconnecting session {}", self.generation);
        }
        self.teardown();
        self.set_state(ConnectionState::Idle);
    }

    fn handle_capture(&mut self, block: Vec<f32>) {
        if self.state() != ConnectionState::Open {
            return;
        }
        let Some(frame) = self.capture.process(block) else {
            return;
        };
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.channel.send_audio(frame) {
                debug!("Dropping capture frame: {}", e);
            }
        }
    }

    fn handle_capture_fault(&mut self, message: String) {
        warn!("Capture device fault: {}", message);
        if self.capture.record_fault(&message) {
            self.fail(ParleyError::DeviceError(message));
        }
    }

    fn handle_channel(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => self.on_opened(),
            ChannelEvent::InputTranscript(text) => self.transcript.push_caller(&text),
            ChannelEvent::OutputTranscript(text) => self.transcript.push_agent(&text),
            ChannelEvent::TurnComplete => {
                for message in self.transcript.complete_turn() {
                    self.add_message(message);
                }
            }
            ChannelEvent::AudioChunk(payload) => self.on_audio_chunk(&payload),
            ChannelEvent::ToolInvocation(invocation) => self.on_tool_invocation(invocation),
            ChannelEvent::Interrupted => self.on_interrupted(),
            ChannelEvent::Closed => self.on_closed(),
            ChannelEvent::Error(message) => {
                self.fail(ParleyError::ChannelError(message));
            }
        }
    }

    fn on_opened(&mut self) {
        if self.state() != ConnectionState::Connecting {
            debug!("Ignoring open notice in state {}", self.state());
            return;
        }

        let started = match self.session.as_mut() {
            Some(session) => {
                session.connect_deadline = None;
                session.capture.start()
            }
            None => return,
        };

        if let Err(e) = started {
            self.fail(e);
            return;
        }

        self.shared.update(|s| s.connected_at = Some(Utc::now()));
        self.set_state(ConnectionState::Open);
        self.add_message(Message::system(SESSION_OPENED_NOTE));
    }

    fn on_audio_chunk(&mut self, payload: &[u8]) {
        let was_speaking = self.playback.is_speaking();
        let result = match self.session.as_mut() {
            Some(session) => self.playback.enqueue(payload, session.sink.as_mut()),
            None => return,
        };

        match result {
            Ok(_) => {
                if !was_speaking {
                    self.set_speaking(true);
                }
            }
            Err(e) if e.is_recoverable() => warn!("Dropping audio chunk: {}", e),
            Err(e) => self.fail(e),
        }
    }

    fn on_tool_invocation(&mut self, invocation: ToolInvocation) {
        let tools = self.tools;
        let outcome = self.shared.update(|s| tools.handle(&invocation, &mut s.lead));

        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.channel.send_tool_response(outcome.ack.clone()) {
                warn!("Failed to acknowledge call {}: {}", invocation.id, e);
            }
        }

        if outcome.lead_changed() {
            let lead = self.shared.lead();
            self.emit(SessionEvent::LeadUpdated(lead));
        }
        if let Some(note) = outcome.note {
            self.add_message(note);
        }
    }

    fn on_interrupted(&mut self) {
        let was_speaking = match self.session.as_mut() {
            Some(session) => self.playback.interrupt(session.sink.as_mut()),
            None => return,
        };
        info!("Agent interrupted");
        if was_speaking {
            self.set_speaking(false);
        }
    }

    fn on_closed(&mut self) {
        info!("Remote side closed session {}", self.generation);
        self.teardown();
        self.set_state(ConnectionState::Closed);
        self.add_message(Message::system(SESSION_CLOSED_NOTE));
    }

    fn handle_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Ended(id) => {
                if self.playback.on_item_ended(id) {
                    self.set_speaking(false);
                }
            }
        }
    }

    /// Fatal error: surface it and tear down
    fn fail(&mut self, err: ParleyError) {
        error!("Session {} failed: {}", self.generation, err);
        self.teardown();
        self.report_error(&err);
        self.set_state(ConnectionState::Errored);
    }

    /// Stop capture, stop playback, close the channel, reset buffers
    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.set_state(ConnectionState::Closing);
            session.capture.stop();
            self.playback.stop_all(session.sink.as_mut());
            session.channel.close();
            session.sink.close();
        }
        self.playback.reset();
        self.transcript.clear();
        self.monitor.reset();

        let was_speaking = self.shared.update(|s| {
            let was = s.is_speaking;
            s.is_speaking = false;
            s.volume = 0;
            s.connected_at = None;
            was
        });
        if was_speaking {
            self.emit(SessionEvent::SpeakingChanged(false));
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let previous = self.shared.update(|s| std::mem::replace(&mut s.connection, state));
        if previous != state {
            info!("Session state: {} -> {}", previous, state);
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        self.shared.update(|s| {
            s.is_speaking = speaking;
            if !speaking {
                s.volume = 0;
            }
        });
        if !speaking {
            self.monitor.reset();
        }
        self.emit(SessionEvent::SpeakingChanged(speaking));
    }

    fn add_message(&mut self, message: Message) {
        debug!("{}: {}", message.role, message.text);
        self.shared.update(|s| s.messages.push(message.clone()));
        self.emit(SessionEvent::MessageAdded(message));
    }

    fn report_error(&mut self, err: &ParleyError) {
        let text = err.user_message();
        self.shared.update(|s| s.error = Some(text.clone()));
        self.emit(SessionEvent::Error(text));
    }

    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => debug!("Event queue full, dropping session event"),
        }
    }
}
