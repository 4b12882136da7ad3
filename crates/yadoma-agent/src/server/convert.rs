//! Conversion helpers between engine types, relay outcomes and proto types.

use tonic::Status;
use yadoma_core::RelayError;
use yadoma_proto::v1::{
    BuildImageRequest, GetContainerLogsRequest, GetContainerStatsResponse,
};

use crate::engine::{BuildOptions, EngineError, LogsOptions, StatsRecord};

/// Map `EngineError` to tonic Status.
#[allow(clippy::needless_pass_by_value)]
pub fn to_status(err: EngineError) -> Status {
    match &err {
        EngineError::Api { status, .. } => match *status {
            400 => Status::invalid_argument(err.to_string()),
            401 => Status::unauthenticated(err.to_string()),
            403 => Status::permission_denied(err.to_string()),
            404 => Status::not_found(err.to_string()),
            409 => Status::failed_precondition(err.to_string()),
            _ => Status::internal(err.to_string()),
        },
        EngineError::Http(e) if e.is_timeout() => Status::deadline_exceeded(err.to_string()),
        EngineError::Http(_) => Status::unavailable(err.to_string()),
        EngineError::Config(_) => Status::failed_precondition(err.to_string()),
        EngineError::InvalidArgument(_) => Status::invalid_argument(err.to_string()),
        EngineError::Decode(_) => Status::internal(err.to_string()),
    }
}

/// Status sent to the client when a relay fails after its stream started.
/// Sink failures never get here: the client is already gone.
pub fn relay_status<E: std::fmt::Display>(what: &str, err: &RelayError<E>) -> Status {
    match err {
        RelayError::Source(_) => Status::internal(format!("{what} stream failed: {err}")),
        RelayError::Decode(_) => Status::internal(format!("{what} stream is malformed: {err}")),
        RelayError::Sink(_) => Status::cancelled(format!("{what} stream closed by client")),
    }
}

/// Logs request options. Neither stream selected means both; an empty tail
/// means all lines.
pub fn logs_options(req: &GetContainerLogsRequest) -> LogsOptions {
    let both = !req.stdout && !req.stderr;
    LogsOptions {
        follow: req.follow,
        timestamps: req.timestamps,
        tail: if req.tail.trim().is_empty() {
            "all".into()
        } else {
            req.tail.trim().to_string()
        },
        stdout: both || req.stdout,
        stderr: both || req.stderr,
    }
}

/// Build parameters from the request; the context is taken separately.
pub fn build_options(req: &BuildImageRequest) -> BuildOptions {
    BuildOptions {
        dockerfile: req.dockerfile.clone(),
        tags: req.tags.iter().filter(|t| !t.is_empty()).cloned().collect(),
        no_cache: req.no_cache,
        build_args: req.build_args.clone(),
        labels: req.labels.clone(),
    }
}

pub fn map_stats(stats: &StatsRecord) -> GetContainerStatsResponse {
    GetContainerStatsResponse {
        id: stats.id.clone(),
        cpu_usage: stats.cpu_stats.cpu_usage.total_usage,
        mem_usage: stats.memory_stats.usage,
        mem_limit: stats.memory_stats.limit,
        net_input: stats.net_rx(),
        net_output: stats.net_tx(),
    }
}
