//! End-to-end session tests
//!
//! These drive a running orchestrator through its public handle, with a
//! scripted remote service and in-memory audio devices standing in for the
//! network and the sound card.

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use parley::audio::{AudioBackend, CaptureFormat, CaptureStream, PlaybackEvent, PlaybackSink};
use parley::codec::WireFrame;
use parley::live::{ChannelEvent, LiveChannel, LiveSetup, LiveTransport, ToolAck, ToolInvocation};
use parley::messages::AudioData;
use parley::session::SessionManager;
use parley::utils::{CaptureSender, ChannelEventSender, PlaybackNotifier};
use parley::{
    ConnectionState, OrchestratorBuilder, OrchestratorHandle, ParleyError, Role, SessionConfig,
    SessionEvent, SharedSessionState,
};
use serde_json::json;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Everything the fakes observed
#[derive(Default)]
struct World {
    setups: Vec<LiveSetup>,
    remote: Option<ChannelEventSender>,
    mic: Option<CaptureSender>,
    speaker: Option<PlaybackNotifier>,
    capture_running: bool,
    sink_open: bool,
    channel_closed: bool,
    clock: f64,
    scheduled: Vec<(u64, f64, f64)>,
    stopped: Vec<u64>,
    sent_audio: Vec<WireFrame>,
    acks: Vec<ToolAck>,
    deny_microphone: bool,
}

type SharedWorld = Arc<Mutex<World>>;

struct Mic(SharedWorld);

impl CaptureStream for Mic {
    fn start(&mut self) -> parley::Result<()> {
        self.0.lock().capture_running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.0.lock().capture_running = false;
    }

    fn is_running(&self) -> bool {
        self.0.lock().capture_running
    }
}

struct Speaker(SharedWorld);

impl PlaybackSink for Speaker {
    fn current_time(&self) -> f64 {
        self.0.lock().clock
    }

    fn schedule(&mut self, id: u64, audio: AudioData, start_at: f64) -> parley::Result<()> {
        self.0
            .lock()
            .scheduled
            .push((id, start_at, audio.duration_seconds()));
        Ok(())
    }

    fn stop(&mut self, id: u64) {
        self.0.lock().stopped.push(id);
    }

    fn output_rms(&self) -> f32 {
        0.05
    }

    fn close(&mut self) {
        self.0.lock().sink_open = false;
    }
}

struct Devices(SharedWorld);

impl AudioBackend for Devices {
    fn open_input(
        &mut self,
        _format: CaptureFormat,
        sender: CaptureSender,
    ) -> parley::Result<Box<dyn CaptureStream>> {
        let mut world = self.0.lock();
        if world.deny_microphone {
            return Err(ParleyError::DeviceError("permission denied".into()));
        }
        world.mic = Some(sender);
        Ok(Box::new(Mic(Arc::clone(&self.0))))
    }

    fn open_output(&mut self, notifier: PlaybackNotifier) -> parley::Result<Box<dyn PlaybackSink>> {
        let mut world = self.0.lock();
        world.speaker = Some(notifier);
        world.sink_open = true;
        Ok(Box::new(Speaker(Arc::clone(&self.0))))
    }
}

struct Link(SharedWorld);

impl LiveChannel for Link {
    fn send_audio(&mut self, frame: WireFrame) -> parley::Result<()> {
        self.0.lock().sent_audio.push(frame);
        Ok(())
    }

    fn send_tool_response(&mut self, ack: ToolAck) -> parley::Result<()> {
        self.0.lock().acks.push(ack);
        Ok(())
    }

    fn close(&mut self) {
        self.0.lock().channel_closed = true;
    }
}

struct Service(SharedWorld);

impl LiveTransport for Service {
    fn connect(
        &mut self,
        setup: &LiveSetup,
        events: ChannelEventSender,
    ) -> parley::Result<Box<dyn LiveChannel>> {
        let mut world = self.0.lock();
        world.setups.push(setup.clone());
        world.remote = Some(events);
        world.channel_closed = false;
        Ok(Box::new(Link(Arc::clone(&self.0))))
    }
}

struct TestSession {
    handle: OrchestratorHandle,
    world: SharedWorld,
    join: Option<JoinHandle<()>>,
}

impl TestSession {
    fn start(config: SessionConfig) -> Self {
        let world = SharedWorld::default();
        let (orchestrator, handle) = OrchestratorBuilder::new()
            .with_config(config)
            .with_backend(Box::new(Devices(Arc::clone(&world))))
            .with_transport(Box::new(Service(Arc::clone(&world))))
            .build()
            .expect("build orchestrator");
        let join = orchestrator.start().expect("start dispatch");
        Self {
            handle,
            world,
            join: Some(join),
        }
    }

    fn open() -> Self {
        let session = Self::start(SessionConfig::default().with_api_key("test-key"));
        session.handle.connect().expect("connect");
        session.remote(ChannelEvent::Opened);
        session
    }

    /// Push a remote event and wait for it to be handled
    fn remote(&self, event: ChannelEvent) {
        let sender = self.world.lock().remote.clone().expect("no remote link");
        assert!(sender.send(event));
        self.handle.sync().expect("sync");
    }

    fn speak(&self, block: Vec<f32>) {
        let mic = self.world.lock().mic.clone().expect("no microphone");
        assert!(mic.send_block(block));
        self.handle.sync().expect("sync");
    }

    fn finish_playback(&self, id: u64) {
        let speaker = self.world.lock().speaker.clone().expect("no speaker");
        assert!(speaker.try_notify(PlaybackEvent::Ended(id)));
        self.handle.sync().expect("sync");
    }

    fn events(&self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.handle.try_recv_event()).collect()
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        let _ = self.handle.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// 100 ms of PCM16 at 24 kHz
fn chunk() -> Vec<u8> {
    vec![0u8; 4800]
}

#[test]
fn test_connect_without_credentials_is_config_error() {
    let session = TestSession::start(SessionConfig::default());
    let result = session.handle.connect();

    assert!(matches!(result, Err(ParleyError::ConfigError(_))));
    assert!(session.world.lock().setups.is_empty());
    assert!(!session.world.lock().sink_open);
}

#[test]
fn test_microphone_denied_is_device_error() {
    let session = TestSession::start(SessionConfig::default().with_api_key("k"));
    session.world.lock().deny_microphone = true;

    let result = session.handle.connect();
    assert!(matches!(result, Err(ParleyError::DeviceError(_))));
    assert_eq!(session.handle.connection_state(), ConnectionState::Errored);
    assert!(!session.world.lock().sink_open, "speaker should be released");
    assert!(session.handle.error().is_some());
}

#[test]
fn test_connect_negotiates_fixed_setup() {
    let session = TestSession::start(SessionConfig::default().with_api_key("k"));
    session.handle.connect().unwrap();
    assert_eq!(session.handle.connection_state(), ConnectionState::Connecting);

    let world = session.world.lock();
    let setup = &world.setups[0];
    assert!(setup.input_transcription);
    assert!(setup.output_transcription);
    assert_eq!(setup.voice, "Zephyr");
    assert_eq!(setup.function_declarations[0]["name"], "captureLeadDetails");
}

#[test]
fn test_open_starts_streaming_microphone() {
    let session = TestSession::open();
    assert_eq!(session.handle.connection_state(), ConnectionState::Open);
    assert!(session.world.lock().capture_running);

    session.speak(vec![0.2; 4096]);
    session.speak(vec![0.001; 4096]);

    let world = session.world.lock();
    assert_eq!(world.sent_audio.len(), 2);
    assert_eq!(world.sent_audio[0].data.len(), 8192);
    assert_eq!(world.sent_audio[0].mime_type(), "audio/pcm;rate=16000");
    assert!(world.sent_audio[1].data.iter().all(|&b| b == 0), "quiet block gated");
}

#[test]
fn test_sensitivity_change_applies_to_next_block() {
    let session = TestSession::open();
    session.speak(vec![0.02; 64]);

    session.handle.set_sensitivity(0.0).unwrap();
    session.speak(vec![0.02; 64]);

    let world = session.world.lock();
    assert!(world.sent_audio[0].data.iter().any(|&b| b != 0));
    assert!(world.sent_audio[1].data.iter().all(|&b| b == 0));
}

#[test]
fn test_chunks_are_scheduled_back_to_back() {
    let session = TestSession::open();
    session.world.lock().clock = 1.0;

    session.remote(ChannelEvent::AudioChunk(chunk()));
    session.remote(ChannelEvent::AudioChunk(chunk()));
    session.remote(ChannelEvent::AudioChunk(chunk()));

    let world = session.world.lock();
    let starts: Vec<f64> = world.scheduled.iter().map(|s| s.1).collect();
    assert_eq!(starts.len(), 3);
    assert!((starts[0] - 1.0).abs() < 1e-9);
    assert!((starts[1] - 1.1).abs() < 1e-9);
    assert!((starts[2] - 1.2).abs() < 1e-9);
    drop(world);
    assert!(session.handle.is_speaking());
}

#[test]
fn test_speaking_clears_when_last_chunk_ends() {
    let session = TestSession::open();
    session.remote(ChannelEvent::AudioChunk(chunk()));
    session.remote(ChannelEvent::AudioChunk(chunk()));

    session.finish_playback(1);
    assert!(session.handle.is_speaking());
    session.finish_playback(2);
    assert!(!session.handle.is_speaking());

    // Unknown ids change nothing
    session.finish_playback(99);
    assert!(!session.handle.is_speaking());
}

#[test]
fn test_interruption_resets_to_current_clock() {
    let session = TestSession::open();
    session.world.lock().clock = 3.0;
    for _ in 0..3 {
        session.remote(ChannelEvent::AudioChunk(chunk()));
    }

    session.world.lock().clock = 3.15;
    session.remote(ChannelEvent::Interrupted);
    assert!(!session.handle.is_speaking());
    assert_eq!(session.world.lock().stopped, vec![1, 2, 3]);

    // Late end notice for an interrupted chunk is ignored
    session.finish_playback(2);
    assert!(!session.handle.is_speaking());

    session.remote(ChannelEvent::AudioChunk(chunk()));
    let last = *session.world.lock().scheduled.last().unwrap();
    assert!((last.1 - 3.15).abs() < 1e-9);
}

#[test]
fn test_turn_produces_ordered_messages() {
    let session = TestSession::open();
    session.remote(ChannelEvent::InputTranscript("My furnace ".into()));
    session.remote(ChannelEvent::InputTranscript("stopped.".into()));
    session.remote(ChannelEvent::OutputTranscript("I can help.".into()));
    session.remote(ChannelEvent::TurnComplete);
    session.remote(ChannelEvent::TurnComplete);

    let messages = session.handle.messages();
    let turn: Vec<(Role, &str)> = messages
        .iter()
        .skip(1)
        .map(|m| (m.role, m.text.as_str()))
        .collect();
    assert_eq!(
        turn,
        vec![(Role::User, "My furnace stopped."), (Role::Agent, "I can help.")]
    );
}

#[test]
fn test_lead_capture_round_trip() {
    let session = TestSession::open();
    session.events();

    session.remote(ChannelEvent::ToolInvocation(ToolInvocation {
        id: "fc-1".into(),
        name: "captureLeadDetails".into(),
        args: json!({"name": "emergency", "agentPersona": "mike"}),
    }));
    session.remote(ChannelEvent::ToolInvocation(ToolInvocation {
        id: "fc-2".into(),
        name: "captureLeadDetails".into(),
        args: json!({"agentPersona": "mike", "heatingSource": "oil"}),
    }));
    session.remote(ChannelEvent::ToolInvocation(ToolInvocation {
        id: "fc-3".into(),
        name: "captureLeadDetails".into(),
        args: json!({"agentPersona": "robot"}),
    }));

    let lead = session.handle.lead();
    assert_eq!(lead.name.as_deref(), Some("emergency"));
    assert!(lead.is_emergency());
    assert!(lead.is_heritage());

    let world = session.world.lock();
    let ids: Vec<&str> = world.acks.iter().map(|a| a.invocation_id.as_str()).collect();
    assert_eq!(ids, vec!["fc-1", "fc-2", "fc-3"]);
    assert_eq!(world.acks[0].result["result"], "Success");
    assert_eq!(world.acks[2].result["result"], "Ignored");
    drop(world);

    let lead_events = session
        .events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::LeadUpdated(_)))
        .count();
    assert_eq!(lead_events, 2);
}

#[test]
fn test_remote_close_tears_down_and_notes_it() {
    let session = TestSession::open();
    session.remote(ChannelEvent::AudioChunk(chunk()));
    session.remote(ChannelEvent::Closed);

    assert_eq!(session.handle.connection_state(), ConnectionState::Closed);
    assert!(!session.handle.is_speaking());
    assert_eq!(session.handle.volume(), 0);

    let world = session.world.lock();
    assert!(!world.capture_running);
    assert!(!world.sink_open);
    assert!(world.channel_closed);
    drop(world);

    let last = session.handle.messages().pop().unwrap();
    assert_eq!(last.role, Role::System);
}

#[test]
fn test_remote_error_surfaces_single_error_state() {
    let session = TestSession::open();
    session.remote(ChannelEvent::Error("quota exceeded".into()));

    assert_eq!(session.handle.connection_state(), ConnectionState::Errored);
    assert_eq!(
        session.handle.error().as_deref(),
        Some("Link failure: quota exceeded")
    );
    assert!(!session.world.lock().capture_running);
}

#[test]
fn test_disconnect_from_any_state() {
    let session = TestSession::start(SessionConfig::default().with_api_key("k"));
    session.handle.disconnect().unwrap();
    assert_eq!(session.handle.connection_state(), ConnectionState::Idle);

    session.handle.connect().unwrap();
    session.handle.disconnect().unwrap();
    assert_eq!(session.handle.connection_state(), ConnectionState::Idle);
    assert!(session.world.lock().channel_closed);

    session.handle.disconnect().unwrap();
    assert_eq!(session.handle.connection_state(), ConnectionState::Idle);
}

#[test]
fn test_events_from_old_session_are_ignored() {
    let session = TestSession::open();
    let stale_remote = session.world.lock().remote.clone().unwrap();
    let stale_mic = session.world.lock().mic.clone().unwrap();

    session.handle.disconnect().unwrap();
    session.handle.connect().unwrap();
    session.remote(ChannelEvent::Opened);
    let sent_before = session.world.lock().sent_audio.len();

    assert!(stale_remote.send(ChannelEvent::Closed));
    assert!(stale_mic.send_block(vec![0.5; 16]));
    session.handle.sync().unwrap();

    assert_eq!(session.handle.connection_state(), ConnectionState::Open);
    assert_eq!(session.world.lock().sent_audio.len(), sent_before);
}

#[test]
fn test_volume_follows_speech() {
    // The manager is driven by hand here, so every tick happens exactly when
    // the test says and no ticker thread is involved.
    let world = SharedWorld::default();
    let (input_tx, inputs) = bounded(64);
    let (event_tx, _events) = bounded(64);
    let state = SharedSessionState::new();
    let mut manager = SessionManager::new(
        SessionConfig::default().with_api_key("k"),
        Box::new(Devices(Arc::clone(&world))),
        Box::new(Service(Arc::clone(&world))),
        input_tx,
        state.clone(),
        event_tx,
    );
    let pump = |manager: &mut SessionManager| {
        while let Ok(input) = inputs.try_recv() {
            manager.handle(input);
        }
    };
    manager.connect().unwrap();
    let remote = world.lock().remote.clone().expect("no remote link");
    assert!(remote.send(ChannelEvent::Opened));
    pump(&mut manager);
    manager.tick(Instant::now());
    assert_eq!(state.volume(), 0);

    assert!(remote.send(ChannelEvent::AudioChunk(chunk())));
    pump(&mut manager);
    manager.tick(Instant::now());
    assert!(state.volume() > 0);

    let speaker = world.lock().speaker.clone().expect("no speaker");
    assert!(speaker.try_notify(PlaybackEvent::Ended(1)));
    pump(&mut manager);
    manager.tick(Instant::now());
    assert_eq!(state.volume(), 0);
}

#[test]
fn test_unequal_chunks_start_where_the_previous_ends() {
    let session = TestSession::open();
    session.world.lock().clock = 2.0;

    // 1.0 s then 1.5 s then 0.5 s of PCM16 at 24 kHz
    session.remote(ChannelEvent::AudioChunk(vec![0u8; 48000]));
    session.remote(ChannelEvent::AudioChunk(vec![0u8; 72000]));
    session.world.lock().clock = 2.7;
    session.remote(ChannelEvent::AudioChunk(vec![0u8; 24000]));

    let world = session.world.lock();
    let scheduled: Vec<(f64, f64)> = world.scheduled.iter().map(|s| (s.1, s.2)).collect();
    assert_eq!(scheduled.len(), 3);
    assert!((scheduled[0].0 - 2.0).abs() < 1e-9);
    assert!((scheduled[1].0 - 3.0).abs() < 1e-9);
    assert!((scheduled[1].1 - 1.5).abs() < 1e-9);
    assert!((scheduled[2].0 - 4.5).abs() < 1e-9);
}

#[test]
fn test_clear_history_drops_messages_and_lead() {
    let session = TestSession::open();
    session.remote(ChannelEvent::ToolInvocation(ToolInvocation {
        id: "fc-1".into(),
        name: "captureLeadDetails".into(),
        args: json!({"agentPersona": "sarah", "phone": "905-555-0199"}),
    }));
    assert!(!session.handle.messages().is_empty());

    session.handle.clear_history().unwrap();
    session.handle.sync().unwrap();
    assert!(session.handle.messages().is_empty());
    assert!(session.handle.lead().is_empty());
}
