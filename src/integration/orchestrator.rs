//! Dispatch thread for the voice session
//!
//! UI commands, capture blocks, remote events and playback notices all land
//! on one queue. A single thread drains it, with a ticker driving the volume
//! monitor and the connect timeout.

use crate::audio::device::AudioBackend;
use crate::integration::config::SessionConfig;
use crate::lead::LeadRecord;
use crate::live::{GeminiTransport, LiveTransport};
use crate::messages::Message;
use crate::session::{Flow, SessionManager};
use crate::state::{
    ConnectionState, SessionCommand, SessionEvent, SessionSnapshot, SharedSessionState,
};
use crate::utils::SessionInput;
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Handle for controlling the session from the UI
#[derive(Clone)]
pub struct OrchestratorHandle {
    input_tx: Sender<SessionInput>,
    event_rx: Receiver<SessionEvent>,
    state: SharedSessionState,
}

impl OrchestratorHandle {
    fn send_command(&self, command: SessionCommand) -> Result<()> {
        self.input_tx.send(SessionInput::Command(command)).map_err(|e| {
            ParleyError::OrchestratorError(format!("Failed to send command: {}", e))
        })
    }

    fn await_reply<T>(rx: Receiver<T>) -> Result<T> {
        rx.recv()
            .map_err(|_| ParleyError::OrchestratorError("Dispatch loop stopped".into()))
    }

    /// Start a session; returns once devices are open and negotiation began
    pub fn connect(&self) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.send_command(SessionCommand::Connect { reply })?;
        Self::await_reply(rx)?
    }

    /// Tear down the current session, if any
    pub fn disconnect(&self) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.send_command(SessionCommand::Disconnect { reply })?;
        Self::await_reply(rx)
    }

    /// Gate sensitivity for subsequent capture blocks, clamped to 0..=1
    pub fn set_sensitivity(&self, sensitivity: f32) -> Result<()> {
        self.send_command(SessionCommand::SetSensitivity(sensitivity))
    }

    pub fn clear_history(&self) -> Result<()> {
        self.send_command(SessionCommand::ClearHistory)
    }

    /// Wait until every input queued before this call has been handled
    pub fn sync(&self) -> Result<()> {
        let (reply, rx) = bounded(1);
        self.send_command(SessionCommand::Sync { reply })?;
        Self::await_reply(rx)
    }

    /// Tear down and stop the dispatch thread
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(SessionCommand::Shutdown)
    }

    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn event_receiver(&self) -> Receiver<SessionEvent> {
        self.event_rx.clone()
    }

    pub fn state(&self) -> &SharedSessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.connection_state()
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    pub fn volume(&self) -> u8 {
        self.state.volume()
    }

    pub fn error(&self) -> Option<String> {
        self.state.error()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.messages()
    }

    pub fn lead(&self) -> LeadRecord {
        self.state.lead()
    }

    pub fn session_duration(&self) -> Option<Duration> {
        self.state.session_duration()
    }
}

/// Owns everything the dispatch thread needs until it starts
pub struct Orchestrator {
    config: SessionConfig,
    backend: Box<dyn AudioBackend>,
    transport: Box<dyn LiveTransport>,
    input_tx: Sender<SessionInput>,
    input_rx: Receiver<SessionInput>,
    event_tx: Sender<SessionEvent>,
    state: SharedSessionState,
}

impl Orchestrator {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn AudioBackend>,
        transport: Box<dyn LiveTransport>,
    ) -> (Self, OrchestratorHandle) {
        let capacity = config.channel_buffer_size.max(1);
        let (input_tx, input_rx) = bounded(capacity);
        let (event_tx, event_rx) = bounded(capacity);
        let state = SharedSessionState::with_sensitivity(config.sensitivity);

        let handle = OrchestratorHandle {
            input_tx: input_tx.clone(),
            event_rx,
            state: state.clone(),
        };

        let orchestrator = Self {
            config,
            backend,
            transport,
            input_tx,
            input_rx,
            event_tx,
            state,
        };

        (orchestrator, handle)
    }

    /// Spawn the dispatch thread
    ///
    /// Device streams are created on that thread and never leave it.
    pub fn start(self) -> Result<JoinHandle<()>> {
        let Orchestrator {
            config,
            backend,
            transport,
            input_tx,
            input_rx,
            event_tx,
            state,
        } = self;

        let interval = Duration::from_millis(config.monitor_interval_ms.max(1));

        thread::Builder::new()
            .name("parley-dispatch".into())
            .spawn(move || {
                info!("Dispatch loop started");
                let mut manager =
                    SessionManager::new(config, backend, transport, input_tx, state, event_tx);
                let ticker = tick(interval);

                loop {
                    select! {
                        recv(input_rx) -> input => match input {
                            Ok(input) => {
                                if manager.handle(input) == Flow::Exit {
                                    break;
                                }
                            }
                            Err(_) => {
                                warn!("Input queue disconnected");
                                manager.disconnect();
                                break;
                            }
                        },
                        recv(ticker) -> _ => manager.tick(Instant::now()),
                    }
                }

                debug!("Dispatch loop exiting");
                info!("Dispatch loop stopped");
            })
            .map_err(|e| {
                ParleyError::OrchestratorError(format!("Failed to spawn dispatch thread: {}", e))
            })
    }
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    config: SessionConfig,
    backend: Option<Box<dyn AudioBackend>>,
    transport: Option<Box<dyn LiveTransport>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            backend: None,
            transport: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.config.sensitivity = sensitivity;
        self
    }

    /// Use a specific audio backend instead of the system devices
    pub fn with_backend(mut self, backend: Box<dyn AudioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use a specific remote transport instead of Gemini Live
    pub fn with_transport(mut self, transport: Box<dyn LiveTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<(Orchestrator, OrchestratorHandle)> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => default_backend(&self.config)?,
        };
        let transport = self.transport.unwrap_or_else(|| {
            Box::new(GeminiTransport::new().with_endpoint(self.config.endpoint.clone()))
        });
        Ok(Orchestrator::new(self.config, backend, transport))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "audio-io")]
fn default_backend(config: &SessionConfig) -> Result<Box<dyn AudioBackend>> {
    Ok(Box::new(crate::audio::CpalBackend::new(
        config.output_sample_rate,
    )))
}

#[cfg(not(feature = "audio-io"))]
fn default_backend(_config: &SessionConfig) -> Result<Box<dyn AudioBackend>> {
    Err(ParleyError::ConfigError(
        "built without audio-io; supply an audio backend".into(),
    ))
}
