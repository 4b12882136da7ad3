//! gRPC server for the Yadoma agent.

mod container_svc;
pub mod convert;
mod image_svc;
pub mod streaming;

pub use container_svc::ContainerServiceImpl;
pub use image_svc::ImageServiceImpl;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tonic::transport::Server;
use tracing::info;

use yadoma_proto::v1::container_service_server::ContainerServiceServer;
use yadoma_proto::v1::image_service_server::ImageServiceServer;

use crate::config::StreamConfig;
use crate::engine::EngineApi;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// gRPC server handle.
pub struct GrpcServer {
    engine: Arc<dyn EngineApi>,
    stream: StreamConfig,
}

impl GrpcServer {
    /// Create a server whose services share `engine`.
    pub const fn new(engine: Arc<dyn EngineApi>, stream: StreamConfig) -> Self {
        Self { engine, stream }
    }

    pub fn container_service(&self) -> ContainerServiceImpl {
        ContainerServiceImpl::new(Arc::clone(&self.engine), self.stream)
    }

    pub fn image_service(&self) -> ImageServiceImpl {
        ImageServiceImpl::new(Arc::clone(&self.engine), self.stream)
    }

    /// Serve on TCP until `shutdown` resolves. In-flight streams are
    /// dropped once the transport winds down.
    pub async fn serve_tcp(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), ServerError> {
        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<ContainerServiceServer<ContainerServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<ImageServiceServer<ImageServiceImpl>>()
            .await;

        info!(%addr, "Starting gRPC server on TCP");

        Server::builder()
            .http2_keepalive_interval(Some(Duration::from_secs(30)))
            .http2_keepalive_timeout(Some(Duration::from_secs(10)))
            .add_service(health_service)
            .add_service(ContainerServiceServer::new(self.container_service()))
            .add_service(ImageServiceServer::new(self.image_service()))
            .serve_with_shutdown(addr, shutdown)
            .await?;

        info!("gRPC server stopped");
        Ok(())
    }
}
