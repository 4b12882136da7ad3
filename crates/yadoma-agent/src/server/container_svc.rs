//! `ContainerService` gRPC implementation.
//!
//! Streams container logs and resource-usage records from the engine.

use std::sync::Arc;

use bytes::Bytes;
use tonic::{Request, Response, Status};
use tracing::{info, instrument, trace};

use yadoma_core::logs::{StreamKind, relay_logs};
use yadoma_core::relay::{RecordDecoder, relay_decoded};
use yadoma_proto::v1::{
    GetContainerLogsRequest, GetContainerLogsResponse, GetContainerStatsRequest,
    GetContainerStatsResponse, container_service_server::ContainerService,
};

use super::convert::{logs_options, map_stats, to_status};
use super::streaming::{ResponseStream, spawn_relay};
use crate::config::StreamConfig;
use crate::engine::{EngineApi, StatsRecord};

/// `ContainerService` implementation backed by an [`EngineApi`].
pub struct ContainerServiceImpl {
    engine: Arc<dyn EngineApi>,
    stream: StreamConfig,
}

impl ContainerServiceImpl {
    /// Create a new `ContainerService`.
    pub const fn new(engine: Arc<dyn EngineApi>, stream: StreamConfig) -> Self {
        Self { engine, stream }
    }
}

fn require_id(id: &str) -> Result<&str, Status> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Status::invalid_argument("container ID is required"));
    }
    Ok(id)
}

#[tonic::async_trait]
impl ContainerService for ContainerServiceImpl {
    type GetContainerLogsStream = ResponseStream<GetContainerLogsResponse>;
    type GetContainerStatsStream = ResponseStream<GetContainerStatsResponse>;

    #[instrument(skip(self, request), fields(rpc = "GetContainerLogs"))]
    async fn get_container_logs(
        &self,
        request: Request<GetContainerLogsRequest>,
    ) -> Result<Response<Self::GetContainerLogsStream>, Status> {
        let req = request.into_inner();
        let id = require_id(&req.id)?;
        let options = logs_options(&req);

        let inspect = self.engine.inspect_container(id).await.map_err(to_status)?;
        let kind = StreamKind::for_tty(inspect.tty());
        let source = self
            .engine
            .container_logs(id, &options)
            .await
            .map_err(to_status)?;

        info!(container = %id, follow = options.follow, tail = %options.tail, ?kind, "Streaming container logs");

        let chunk_size = self.stream.chunk_size;
        let stream = spawn_relay("log", self.stream.buffer, move |sink| async move {
            let sink = &sink;
            relay_logs(source, kind, chunk_size, move |chunk: Bytes| {
                sink.send(GetContainerLogsResponse {
                    chunk: chunk.to_vec(),
                })
            })
            .await
        });
        Ok(Response::new(stream))
    }

    #[instrument(skip(self, request), fields(rpc = "GetContainerStats"))]
    async fn get_container_stats(
        &self,
        request: Request<GetContainerStatsRequest>,
    ) -> Result<Response<Self::GetContainerStatsStream>, Status> {
        let req = request.into_inner();
        let id = require_id(&req.id)?;

        let source = self
            .engine
            .container_stats(id, req.stream)
            .await
            .map_err(to_status)?;

        info!(container = %id, stream = req.stream, "Streaming container stats");

        let max_record_bytes = self.stream.max_record_bytes;
        let stream = spawn_relay("stats", self.stream.buffer, move |sink| async move {
            let sink = &sink;
            let mut source = source;
            let decoder = RecordDecoder::new(&mut source).with_max_record_bytes(max_record_bytes);
            relay_decoded(decoder, move |stats: StatsRecord| {
                trace!(container = %stats.id, cpu = stats.cpu_stats.cpu_usage.total_usage, "Stats record");
                sink.send(map_stats(&stats))
            })
            .await
        });
        Ok(Response::new(stream))
    }
}
