//! Yadoma Agent
//!
//! Runs next to a container engine and serves its log, stats, pull and
//! build streams over gRPC.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use yadoma_agent::config::{AgentConfig, StreamConfig};
use yadoma_agent::engine::HttpEngine;
use yadoma_agent::server::GrpcServer;

#[derive(Parser, Debug)]
#[command(name = "yadoma-agent")]
#[command(version, about = "Yadoma agent - container engine streams over gRPC")]
struct Args {
    /// gRPC bind address
    #[arg(long, default_value = "0.0.0.0:50001", env = "YADOMA_ADDR")]
    addr: SocketAddr,

    /// Container engine API endpoint (http:// or https://). Unix sockets are
    /// not supported; expose the engine over TCP.
    #[arg(long, default_value = "http://127.0.0.1:2375", env = "YADOMA_ENGINE_URL")]
    engine_url: String,

    /// Timeout in seconds for single-shot engine requests. Streams have none.
    #[arg(long, default_value_t = 30, env = "YADOMA_REQUEST_TIMEOUT")]
    request_timeout: u64,

    /// Largest chunk forwarded per log, pull or build message.
    #[arg(long, default_value_t = yadoma_core::relay::DEFAULT_CHUNK_SIZE, env = "YADOMA_CHUNK_SIZE")]
    chunk_size: usize,

    /// Messages queued per stream for a slow client.
    #[arg(long, default_value_t = 16, env = "YADOMA_STREAM_BUFFER")]
    stream_buffer: usize,

    /// Largest single stats record accepted from the engine, in bytes.
    #[arg(long, default_value_t = yadoma_core::relay::DEFAULT_MAX_RECORD_BYTES, env = "YADOMA_MAX_RECORD_BYTES")]
    max_record_bytes: usize,

    /// Log level filter for the agent (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "YADOMA_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "YADOMA_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn config(&self) -> AgentConfig {
        AgentConfig::new(self.addr)
            .with_engine_url(self.engine_url.clone())
            .with_request_timeout(Duration::from_secs(self.request_timeout))
            .with_stream(
                StreamConfig::default()
                    .with_chunk_size(self.chunk_size)
                    .with_buffer(self.stream_buffer)
                    .with_max_record_bytes(self.max_record_bytes),
            )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "yadoma_agent={level},yadoma_core={level}",
        level = args.log_level
    );
    yadoma_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let config = args.config();
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.addr,
        engine = %config.engine.base_url,
        chunk_size = config.stream.chunk_size,
        "Starting yadoma-agent"
    );

    let engine = Arc::new(HttpEngine::new(&config.engine)?);
    let server = GrpcServer::new(engine, config.stream);

    server.serve_tcp(config.addr, shutdown_signal()).await?;

    info!("Agent stopped");
    Ok(())
}

/// Resolve on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}
