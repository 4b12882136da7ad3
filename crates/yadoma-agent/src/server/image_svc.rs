//! `ImageService` gRPC implementation.
//!
//! Pull and build progress is forwarded as raw chunks; the client parses
//! the engine's JSON progress messages itself.

use std::sync::Arc;

use bytes::Bytes;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use yadoma_core::relay::relay_bytes_with;
use yadoma_proto::v1::{
    BuildImageRequest, BuildImageResponse, PullImageRequest, PullImageResponse,
    image_service_server::ImageService,
};

use super::convert::{build_options, to_status};
use super::streaming::{ResponseStream, spawn_relay};
use crate::config::StreamConfig;
use crate::engine::EngineApi;

/// `ImageService` implementation backed by an [`EngineApi`].
pub struct ImageServiceImpl {
    engine: Arc<dyn EngineApi>,
    stream: StreamConfig,
}

impl ImageServiceImpl {
    /// Create a new `ImageService`.
    pub const fn new(engine: Arc<dyn EngineApi>, stream: StreamConfig) -> Self {
        Self { engine, stream }
    }
}

#[tonic::async_trait]
impl ImageService for ImageServiceImpl {
    type PullImageStream = ResponseStream<PullImageResponse>;
    type BuildImageStream = ResponseStream<BuildImageResponse>;

    #[instrument(skip(self, request), fields(rpc = "PullImage"))]
    async fn pull_image(
        &self,
        request: Request<PullImageRequest>,
    ) -> Result<Response<Self::PullImageStream>, Status> {
        let req = request.into_inner();
        let reference = req.link.trim();
        if reference.is_empty() {
            return Err(Status::invalid_argument("image link is required"));
        }
        let registry_auth = Some(req.registry_auth.as_str()).filter(|auth| !auth.is_empty());

        let source = self
            .engine
            .pull_image(reference, registry_auth)
            .await
            .map_err(to_status)?;

        info!(image = %reference, authenticated = registry_auth.is_some(), "Pulling image");

        let chunk_size = self.stream.chunk_size;
        let stream = spawn_relay("pull", self.stream.buffer, move |sink| async move {
            let sink = &sink;
            let mut source = source;
            relay_bytes_with(&mut source, chunk_size, move |chunk: Bytes| {
                sink.send(PullImageResponse {
                    chunk: chunk.to_vec(),
                })
            })
            .await
        });
        Ok(Response::new(stream))
    }

    #[instrument(skip(self, request), fields(rpc = "BuildImage"))]
    async fn build_image(
        &self,
        request: Request<BuildImageRequest>,
    ) -> Result<Response<Self::BuildImageStream>, Status> {
        let mut req = request.into_inner();
        if req.dockerfile.trim().is_empty() {
            return Err(Status::invalid_argument("dockerfile is required"));
        }
        if req.build_context.is_empty() {
            return Err(Status::invalid_argument("build context is required"));
        }
        let options = build_options(&req);
        let context = std::mem::take(&mut req.build_context);

        info!(
            dockerfile = %options.dockerfile,
            tags = ?options.tags,
            context_bytes = context.len(),
            no_cache = options.no_cache,
            "Building image"
        );

        let source = self
            .engine
            .build_image(context, &options)
            .await
            .map_err(to_status)?;

        let chunk_size = self.stream.chunk_size;
        let stream = spawn_relay("build", self.stream.buffer, move |sink| async move {
            let sink = &sink;
            let mut source = source;
            relay_bytes_with(&mut source, chunk_size, move |chunk: Bytes| {
                sink.send(BuildImageResponse {
                    chunk: chunk.to_vec(),
                })
            })
            .await
        });
        Ok(Response::new(stream))
    }
}
