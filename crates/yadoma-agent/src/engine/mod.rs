//! Container engine access.
//!
//! The gRPC services talk to the engine through [`EngineApi`], so tests can
//! swap the HTTP client for an in-memory fake. Every streaming call hands
//! back the raw response body as a [`ByteSource`]; decoding is left to the
//! relays in `yadoma-core`.

mod http;
pub mod types;

pub use http::{EngineConfig, HttpEngine};
pub use types::{ContainerInspect, StatsRecord};

use std::collections::HashMap;

use thiserror::Error;
use yadoma_core::io::ByteSource;

/// Engine client errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller-supplied value the engine request cannot carry.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid engine response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Which log lines to fetch and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsOptions {
    pub follow: bool,
    pub timestamps: bool,
    /// Number of lines from the end, or `"all"`.
    pub tail: String,
    pub stdout: bool,
    pub stderr: bool,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: false,
            timestamps: false,
            tail: "all".into(),
            stdout: true,
            stderr: true,
        }
    }
}

/// Parameters of an image build. The context travels separately as a tar
/// archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Path of the Dockerfile inside the build context.
    pub dockerfile: String,
    pub tags: Vec<String>,
    pub no_cache: bool,
    pub build_args: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

/// Operations the agent needs from the container engine.
#[tonic::async_trait]
pub trait EngineApi: Send + Sync {
    /// Fetch container metadata, notably whether it runs with a TTY.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, EngineError>;

    /// Open the log stream of a container.
    ///
    /// The body is raw when the container has a TTY and frame-multiplexed
    /// otherwise.
    async fn container_logs(
        &self,
        id: &str,
        options: &LogsOptions,
    ) -> Result<ByteSource, EngineError>;

    /// Open a stream of concatenated JSON stats records. With `stream` unset
    /// the engine sends a single record and closes.
    async fn container_stats(&self, id: &str, stream: bool) -> Result<ByteSource, EngineError>;

    /// Start pulling an image and return its progress stream.
    async fn pull_image(
        &self,
        reference: &str,
        registry_auth: Option<&str>,
    ) -> Result<ByteSource, EngineError>;

    /// Start a build from a tar `context` and return its output stream.
    async fn build_image(
        &self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> Result<ByteSource, EngineError>;
}
