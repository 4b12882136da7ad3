//! Agent configuration.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use yadoma_core::relay::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RECORD_BYTES};

use crate::engine::EngineConfig;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("stream buffer must be greater than zero")]
    ZeroStreamBuffer,

    #[error("max record size must be greater than zero")]
    ZeroMaxRecordBytes,

    #[error("invalid engine URL: {0}")]
    EngineUrl(String),
}

/// Per-RPC streaming limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Largest chunk forwarded by the byte relays.
    pub chunk_size: usize,
    /// Messages that may queue for a slow client before the relay waits.
    pub buffer: usize,
    /// Largest single JSON record the stats decoder will buffer.
    pub max_record_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer: 16,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl StreamConfig {
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub const fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    #[must_use]
    pub const fn with_max_record_bytes(mut self, max: usize) -> Self {
        self.max_record_bytes = max;
        self
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.buffer == 0 {
            return Err(ConfigError::ZeroStreamBuffer);
        }
        if self.max_record_bytes == 0 {
            return Err(ConfigError::ZeroMaxRecordBytes);
        }
        Ok(())
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// gRPC listen address.
    pub addr: SocketAddr,
    pub engine: EngineConfig,
    pub stream: StreamConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 50001)),
            engine: EngineConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Create a config listening on `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    /// Set the engine endpoint.
    #[must_use]
    pub fn with_engine_url(mut self, url: impl Into<String>) -> Self {
        self.engine.base_url = url.into();
        self
    }

    /// Set the timeout for single-shot engine requests.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.engine.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.engine
            .parse_url()
            .map_err(|e| ConfigError::EngineUrl(e.to_string()))?;
        Ok(())
    }
}
