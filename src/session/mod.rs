//! Per-session components and the manager that drives them

pub mod capture;
pub mod gate;
pub mod lifecycle;
pub mod monitor;
pub mod playback;
pub mod tools;
pub mod transcript;

pub use capture::CapturePipeline;
pub use gate::{CapturedFrame, GateDecision, NoiseGate};
pub use lifecycle::{Flow, Session, SessionManager};
pub use monitor::{energy_to_volume, VolumeMonitor};
pub use playback::{PlaybackItem, PlaybackScheduler};
pub use tools::{ToolCallBridge, ToolOutcome};
pub use transcript::TranscriptAssembler;
