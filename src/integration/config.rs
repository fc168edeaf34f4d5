//! Configuration for the session orchestrator
//!
//! Everything a session needs is fixed here before `connect()`. Sensitivity
//! is only the starting value; it changes at runtime and is never written
//! back.

use crate::codec::{WIRE_INPUT_SAMPLE_RATE, WIRE_OUTPUT_SAMPLE_RATE};
use crate::live::gemini::DEFAULT_ENDPOINT;
use crate::live::{capture_lead_declaration, LiveSetup, ResponseModality, SYSTEM_INSTRUCTION};
use crate::session::gate::{DEFAULT_SENSITIVITY, GATE_CONSTANT};
use crate::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Environment variables checked for the API key, in order
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Credential for the remote service; required
    #[serde(skip_serializing)]
    pub api_key: String,

    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,

    /// Rate of outbound capture frames
    pub input_sample_rate: u32,

    /// Rate of inbound synthesized speech
    pub output_sample_rate: u32,

    /// Samples per capture block
    pub block_size: usize,

    /// Initial gate sensitivity, 0..=1
    pub sensitivity: f32,

    /// Gate threshold is `(1 - sensitivity) * gate_constant`
    pub gate_constant: f32,

    /// Give up on a session that is not open after this long; `None` waits forever
    pub connect_timeout_ms: Option<u64>,

    /// Cadence of the volume monitor
    pub monitor_interval_ms: u64,

    /// Capacity of the dispatch queue
    pub channel_buffer_size: usize,

    /// Consecutive capture faults tolerated before the session is torn down
    pub max_device_faults: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            input_sample_rate: WIRE_INPUT_SAMPLE_RATE,
            output_sample_rate: WIRE_OUTPUT_SAMPLE_RATE,
            block_size: 4096,
            sensitivity: DEFAULT_SENSITIVITY,
            gate_constant: GATE_CONSTANT,
            connect_timeout_ms: Some(15_000),
            monitor_interval_ms: 16,
            channel_buffer_size: 256,
            max_device_faults: 3,
        }
    }
}

impl SessionConfig {
    /// Defaults with the API key taken from the environment
    pub fn from_env() -> Self {
        Self::default().with_env_fallback()
    }

    /// Load a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Fill an empty API key from the environment
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_key.is_empty() {
            if let Some(key) = API_KEY_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            {
                self.api_key = key;
            }
        }
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = text.into();
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.connect_timeout_ms = timeout;
        self
    }

    pub fn with_monitor_interval_ms(mut self, interval: u64) -> Self {
        self.monitor_interval_ms = interval;
        self
    }

    pub fn with_max_device_faults(mut self, faults: u32) -> Self {
        self.max_device_faults = faults;
        self
    }

    /// Check everything `connect()` relies on
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ParleyError::ConfigError(format!(
                "API key is required (set {})",
                API_KEY_VARS.join(" or ")
            )));
        }
        if self.endpoint.is_empty() {
            return Err(ParleyError::ConfigError("endpoint is empty".into()));
        }
        if self.model.is_empty() {
            return Err(ParleyError::ConfigError("model is empty".into()));
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(ParleyError::ConfigError(
                "sample rates must be positive".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(ParleyError::ConfigError("block size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(ParleyError::ConfigError(format!(
                "sensitivity {} is outside 0..=1",
                self.sensitivity
            )));
        }
        if !self.gate_constant.is_finite() || self.gate_constant < 0.0 {
            return Err(ParleyError::ConfigError(format!(
                "invalid gate constant {}",
                self.gate_constant
            )));
        }
        if self.monitor_interval_ms == 0 {
            return Err(ParleyError::ConfigError(
                "monitor interval must be positive".into(),
            ));
        }
        if self.channel_buffer_size == 0 {
            return Err(ParleyError::ConfigError(
                "channel buffer size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Negotiation parameters for the remote service
    pub fn live_setup(&self) -> LiveSetup {
        LiveSetup {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: self.system_instruction.clone(),
            response_modality: ResponseModality::Audio,
            input_transcription: true,
            output_transcription: true,
            function_declarations: vec![capture_lead_declaration()],
        }
    }
}
