//! Wiring between the UI, the devices and the remote service
//!
//! `Orchestrator` owns the dispatch thread; `OrchestratorHandle` is the
//! cloneable front the UI talks to.

pub mod config;
pub mod orchestrator;

pub use config::SessionConfig;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorHandle};
