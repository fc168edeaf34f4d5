//! Gemini Live transport over a WebSocket
//!
//! Each connection gets its own worker thread with a tokio runtime. The
//! dispatch loop talks to it through an unbounded queue of outbound frames
//! and hears back through the `ChannelEventSender`.

use crate::codec::WireFrame;
use crate::live::{ChannelEvent, LiveChannel, LiveSetup, LiveTransport, ToolAck, ToolInvocation};
use crate::utils::ChannelEventSender;
use crate::{ParleyError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

// ---- outbound wire types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupMessage {
    setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Empty>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    function_declarations: Vec<Value>,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Serialize)]
struct RealtimeInput {
    audio: Blob,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    data: String,
    mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponseMessage {
    tool_response: ToolResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize)]
struct FunctionResponse {
    id: String,
    name: String,
    response: Value,
}

// ---- inbound wire types ----

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCall>,
    go_away: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    interrupted: bool,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
}

#[derive(Deserialize, Default)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Deserialize, Default)]
struct Transcription {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ToolCall {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    args: Value,
}

/// Build the first frame of a session
pub fn setup_message(setup: &LiveSetup) -> Result<String> {
    let tools = if setup.function_declarations.is_empty() {
        Vec::new()
    } else {
        vec![Tool {
            function_declarations: setup.function_declarations.clone(),
        }]
    };

    let message = SetupMessage {
        setup: Setup {
            model: qualified_model(&setup.model),
            generation_config: GenerationConfig {
                response_modalities: vec![setup.response_modality.as_wire()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: setup.system_instruction.clone(),
                }],
            },
            tools,
            input_audio_transcription: setup.input_transcription.then_some(Empty {}),
            output_audio_transcription: setup.output_transcription.then_some(Empty {}),
        },
    };

    Ok(serde_json::to_string(&message)?)
}

fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

pub fn audio_message(frame: &WireFrame) -> Result<String> {
    let message = RealtimeInputMessage {
        realtime_input: RealtimeInput {
            audio: Blob {
                data: STANDARD.encode(&frame.data),
                mime_type: frame.mime_type(),
            },
        },
    };
    Ok(serde_json::to_string(&message)?)
}

pub fn tool_response_message(ack: &ToolAck) -> Result<String> {
    let message = ToolResponseMessage {
        tool_response: ToolResponse {
            function_responses: vec![FunctionResponse {
                id: ack.invocation_id.clone(),
                name: ack.function_name.clone(),
                response: ack.result.clone(),
            }],
        },
    };
    Ok(serde_json::to_string(&message)?)
}

/// Translate one server frame into channel events
///
/// Order within a frame: transcripts, turn completion, tool calls, audio,
/// then interruption. Audio parts that fail to decode are skipped.
pub fn decode_server_message(text: &str) -> Result<Vec<ChannelEvent>> {
    let message: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(ChannelEvent::Opened);
    }

    if message.go_away.is_some() {
        warn!("Server announced it will close the session soon");
    }

    let content = message.server_content.unwrap_or_default();

    if let Some(t) = content.input_transcription {
        if !t.text.is_empty() {
            events.push(ChannelEvent::InputTranscript(t.text));
        }
    }
    if let Some(t) = content.output_transcription {
        if !t.text.is_empty() {
            events.push(ChannelEvent::OutputTranscript(t.text));
        }
    }
    if content.turn_complete {
        events.push(ChannelEvent::TurnComplete);
    }

    if let Some(call) = message.tool_call {
        for fc in call.function_calls {
            let args = if fc.args.is_null() {
                Value::Object(Default::default())
            } else {
                fc.args
            };
            events.push(ChannelEvent::ToolInvocation(ToolInvocation {
                id: fc.id,
                name: fc.name,
                args,
            }));
        }
    }

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let Some(inline) = part.inline_data else {
                continue;
            };
            match STANDARD.decode(inline.data.as_bytes()) {
                Ok(bytes) => events.push(ChannelEvent::AudioChunk(bytes)),
                Err(e) => warn!("Skipping undecodable audio part: {}", e),
            }
        }
    }

    if content.interrupted {
        events.push(ChannelEvent::Interrupted);
    }

    Ok(events)
}

enum Outbound {
    Text(String),
    Close,
}

/// Opens Gemini Live sessions
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    endpoint: String,
}

impl GeminiTransport {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for GeminiTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveTransport for GeminiTransport {
    fn connect(
        &mut self,
        setup: &LiveSetup,
        events: ChannelEventSender,
    ) -> Result<Box<dyn LiveChannel>> {
        let setup_json = setup_message(setup)?;
        let url = format!("{}?key={}", self.endpoint, setup.api_key);
        let (out_tx, out_rx) = unbounded_channel();

        // Harmless if a provider is already installed
        let _ = rustls::crypto::ring::default_provider().install_default();

        std::thread::Builder::new()
            .name("gemini-live".into())
            .spawn(move || {
                let runtime = match Runtime::new() {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create tokio runtime: {}", e);
                        events.send(ChannelEvent::Error(format!(
                            "Failed to create runtime: {}",
                            e
                        )));
                        return;
                    }
                };
                runtime.block_on(run_connection(url, setup_json, out_rx, events));
                debug!("Gemini connection worker exiting");
            })
            .map_err(|e| ParleyError::ChannelError(format!("Failed to spawn worker: {}", e)))?;

        info!("Connecting to {}", self.endpoint);
        Ok(Box::new(GeminiChannel { out_tx }))
    }
}

/// Outbound half handed to the session
pub struct GeminiChannel {
    out_tx: UnboundedSender<Outbound>,
}

impl GeminiChannel {
    fn push(&self, text: String) -> Result<()> {
        self.out_tx
            .send(Outbound::Text(text))
            .map_err(|_| ParleyError::ChannelError("Connection is closed".into()))
    }
}

impl LiveChannel for GeminiChannel {
    fn send_audio(&mut self, frame: WireFrame) -> Result<()> {
        self.push(audio_message(&frame)?)
    }

    fn send_tool_response(&mut self, ack: ToolAck) -> Result<()> {
        self.push(tool_response_message(&ack)?)
    }

    fn close(&mut self) {
        let _ = self.out_tx.send(Outbound::Close);
    }
}

async fn run_connection(
    url: String,
    setup_json: String,
    mut out_rx: UnboundedReceiver<Outbound>,
    events: ChannelEventSender,
) {
    let (ws, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("WebSocket connect failed: {}", e);
            events.send(ChannelEvent::Error(format!("Connect failed: {}", e)));
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();

    if let Err(e) = sink.send(WsMessage::Text(setup_json.into())).await {
        events.send(ChannelEvent::Error(format!("Setup failed: {}", e)));
        return;
    }
    debug!("Setup sent, waiting for server");

    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                        events.send(ChannelEvent::Error(format!("Send failed: {}", e)));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    info!("Closed connection locally");
                    return;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    if !dispatch(text.as_str(), &events) {
                        return;
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        if !dispatch(text, &events) {
                            return;
                        }
                    }
                    Err(e) => warn!("Ignoring non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    match frame {
                        Some(f) if f.code != CloseCode::Normal => {
                            warn!("Server closed with {}: {}", f.code, f.reason.as_str());
                            events.send(ChannelEvent::Error(format!(
                                "Closed by server ({}): {}",
                                f.code, f.reason.as_str()
                            )));
                        }
                        _ => {
                            info!("Server closed the connection");
                            events.send(ChannelEvent::Closed);
                        }
                    }
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    events.send(ChannelEvent::Error(e.to_string()));
                    return;
                }
                None => {
                    events.send(ChannelEvent::Closed);
                    return;
                }
            }
        }
    }
}

/// Returns false once the dispatch loop is gone
fn dispatch(text: &str, events: &ChannelEventSender) -> bool {
    match decode_server_message(text) {
        Ok(decoded) => decoded.into_iter().all(|event| events.send(event)),
        Err(e) => {
            warn!("Ignoring malformed server frame: {}", e);
            true
        }
    }
}
