pub mod audio;
pub mod codec;
pub mod integration;
pub mod lead;
pub mod live;
pub mod messages;
pub mod session;
pub mod state;
pub mod utils;

pub use integration::{Orchestrator, OrchestratorBuilder, OrchestratorHandle, SessionConfig};
pub use lead::LeadRecord;
pub use messages::{Message, Role};
pub use state::{ConnectionState, SessionEvent, SessionSnapshot, SharedSessionState};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Tool validation error: {0}")]
    ToolValidationError(String),

    #[error("Encode/decode error: {0}")]
    EncodeDecodeError(String),

    #[error("Orchestrator error: {0}")]
    OrchestratorError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(e: serde_json::Error) -> Self {
        ParleyError::EncodeDecodeError(e.to_string())
    }
}

impl From<toml::de::Error> for ParleyError {
    fn from(e: toml::de::Error) -> Self {
        ParleyError::ConfigError(e.to_string())
    }
}

impl ParleyError {
    /// Check if this error is recoverable
    ///
    /// Non-recoverable errors tear the session down; recoverable ones are
    /// absorbed where they happen and the session continues.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ParleyError::ConfigError(_) => false,
            ParleyError::DeviceError(_) => false,
            ParleyError::ChannelError(_) => false,
            // A bad tool call is acknowledged as a no-op
            ParleyError::ToolValidationError(_) => true,
            // A single frame or chunk is dropped
            ParleyError::EncodeDecodeError(_) => true,
            ParleyError::OrchestratorError(_) => false,
            ParleyError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::ConfigError(msg) => format!("Configuration error: {}", msg),
            ParleyError::DeviceError(_) => {
                "Microphone access denied. Please allow microphone permissions and try again."
                    .to_string()
            }
            ParleyError::ChannelError(msg) => format!("Link failure: {}", msg),
            ParleyError::ToolValidationError(_) => {
                "The agent sent lead details that could not be applied.".to_string()
            }
            ParleyError::EncodeDecodeError(_) => "An audio frame could not be processed.".to_string(),
            ParleyError::OrchestratorError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            ParleyError::IOError(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
