//! Yadoma Core Library
//!
//! The streaming core shared by the agent's streaming RPCs:
//! - Stream relay: fixed-size chunk forwarding from a byte source to a sink
//! - Record relay: incremental decoding of concatenated JSON values
//! - Frame demultiplexing of the engine's combined stdout/stderr format
//! - Log-stream orchestration over TTY and framed sources
//! - Common error types and tracing setup

pub mod demux;
pub mod error;
pub mod io;
pub mod logs;
pub mod relay;
pub mod tracing_init;

pub use error::{DecodeError, FrameError, RelayError};
pub use relay::{RelaySummary, relay_bytes, relay_records};
