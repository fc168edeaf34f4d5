//! Observable session state
//!
//! The dispatch thread is the only writer. UI code reads copies through
//! `SharedSessionState` and may also drain `SessionEvent`s for push updates.

use crate::lead::LeadRecord;
use crate::messages::{Message, MessageLog};
use crate::Result;
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Connection status of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored,
}

impl ConnectionState {
    /// A session exists and holds resources
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// `connect()` may be called from this state
    pub fn can_connect(&self) -> bool {
        !self.is_active() && *self != ConnectionState::Closing
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
        };
        write!(f, "{}", label)
    }
}

/// Requests from the UI handle, answered on the dispatch thread
#[derive(Debug)]
pub enum SessionCommand {
    Connect { reply: Sender<Result<()>> },
    Disconnect { reply: Sender<()> },
    SetSensitivity(f32),
    /// Drop the message list and the lead record
    ClearHistory,
    /// Replies once every earlier input has been handled
    Sync { reply: Sender<()> },
    Shutdown,
}

/// Push notifications for UI consumers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    SpeakingChanged(bool),
    MessageAdded(Message),
    LeadUpdated(LeadRecord),
    Error(String),
}

/// Point-in-time copy of everything the UI renders
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub is_speaking: bool,
    /// Output activity, 0..=255
    pub volume: u8,
    pub error: Option<String>,
    pub messages: MessageLog,
    pub lead: LeadRecord,
    pub sensitivity: f32,
    pub connected_at: Option<DateTime<Utc>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Idle,
            is_speaking: false,
            volume: 0,
            error: None,
            messages: MessageLog::new(),
            lead: LeadRecord::new(),
            sensitivity: 0.8,
            connected_at: None,
        }
    }
}

impl SessionSnapshot {
    /// Time since the session opened, if it is open
    pub fn session_duration(&self) -> Option<Duration> {
        if self.connection != ConnectionState::Open {
            return None;
        }
        let started = self.connected_at?;
        (Utc::now() - started).to_std().ok()
    }
}

/// Thread-safe handle onto the latest snapshot
#[derive(Debug, Clone, Default)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SharedSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_sensitivity(sensitivity: f32) -> Self {
        let state = Self::new();
        state.inner.write().sensitivity = if sensitivity.is_nan() {
            0.8
        } else {
            sensitivity.clamp(0.0, 1.0)
        };
        state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().connection
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.read().is_speaking
    }

    pub fn volume(&self) -> u8 {
        self.inner.read().volume
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.read().messages.all().to_vec()
    }

    pub fn lead(&self) -> LeadRecord {
        self.inner.read().lead.clone()
    }

    pub fn sensitivity(&self) -> f32 {
        self.inner.read().sensitivity
    }

    pub fn session_duration(&self) -> Option<Duration> {
        self.inner.read().session_duration()
    }

    /// Mutate under the write lock; dispatch thread only
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SessionSnapshot) -> R) -> R {
        f(&mut self.inner.write())
    }
}
