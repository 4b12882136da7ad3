//! Yadoma Agent Library
//!
//! Serves the agent's streaming gRPC API on top of a container engine:
//! - Engine client for the Docker Engine REST API
//! - Container log and stats streaming
//! - Image pull and build progress streaming
//! - Agent configuration

pub mod config;
pub mod engine;
pub mod server;

pub use config::{AgentConfig, StreamConfig};
