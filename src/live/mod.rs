//! Contract with the remote dialogue service
//!
//! The orchestrator only knows these types. `gemini` is the WebSocket
//! implementation; tests plug in their own.

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiTransport;
pub use prompt::{capture_lead_declaration, CAPTURE_LEAD_TOOL, SYSTEM_INSTRUCTION};

use crate::codec::WireFrame;
use crate::utils::ChannelEventSender;
use crate::Result;
use serde_json::Value;

/// A function call requested by the remote model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// The single reply owed to every `ToolInvocation`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolAck {
    pub invocation_id: String,
    pub function_name: String,
    pub result: Value,
}

/// Events delivered by a remote channel, in wire order
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Negotiation finished, the session accepts audio
    Opened,
    /// Fragment of the caller's speech transcription
    InputTranscript(String),
    /// Fragment of the agent's speech transcription
    OutputTranscript(String),
    TurnComplete,
    /// Encoded synthesized speech
    AudioChunk(Vec<u8>),
    ToolInvocation(ToolInvocation),
    /// The caller talked over the agent
    Interrupted,
    Closed,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModality {
    Audio,
    Text,
}

impl ResponseModality {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
            ResponseModality::Text => "TEXT",
        }
    }
}

/// Fixed negotiation parameters for one session
#[derive(Debug, Clone)]
pub struct LiveSetup {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub response_modality: ResponseModality,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub function_declarations: Vec<Value>,
}

/// Outbound half of an open remote session
pub trait LiveChannel: Send {
    fn send_audio(&mut self, frame: WireFrame) -> Result<()>;

    fn send_tool_response(&mut self, ack: ToolAck) -> Result<()>;

    /// Fire-and-forget close; never waits for the remote side
    fn close(&mut self);
}

/// Opens remote sessions
pub trait LiveTransport: Send {
    /// Start negotiating a session
    ///
    /// Returns as soon as the attempt is under way. `ChannelEvent::Opened`
    /// (or `Error`) arrives later through `events`.
    fn connect(&mut self, setup: &LiveSetup, events: ChannelEventSender)
        -> Result<Box<dyn LiveChannel>>;
}
