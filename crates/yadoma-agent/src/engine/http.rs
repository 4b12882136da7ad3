//! Docker Engine REST API client.
//!
//! Single-shot calls (inspect) carry the configured request timeout.
//! Streaming calls carry none: their bodies stay open for as long as the
//! engine keeps producing output, and are handed back as [`ByteSource`]s.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Response, Url};
use tracing::debug;
use yadoma_core::io::{ByteSource, ChunkReader};

use super::types::{ApiMessage, ContainerInspect};
use super::{BuildOptions, EngineApi, EngineError, LogsOptions};

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Connection settings for the engine API.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine endpoint, e.g. `http://127.0.0.1:2375`.
    pub base_url: String,
    /// Timeout for single-shot requests.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:2375".into(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Parse and check the endpoint URL.
    pub fn parse_url(&self) -> Result<Url, EngineError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| EngineError::Config(format!("invalid engine URL {:?}: {e}", self.base_url)))?;
        match url.scheme() {
            "http" | "https" => {}
            "unix" => {
                return Err(EngineError::Config(
                    "unix socket engine URLs are not supported; expose the engine over TCP \
                     (e.g. dockerd -H tcp://127.0.0.1:2375) and pass its http:// address"
                        .into(),
                ));
            }
            other => {
                return Err(EngineError::Config(format!(
                    "unsupported engine URL scheme {other:?}"
                )));
            }
        }
        if url.cannot_be_a_base() {
            return Err(EngineError::Config(format!(
                "engine URL {:?} cannot carry a path",
                self.base_url
            )));
        }
        Ok(url)
    }
}

/// [`EngineApi`] over HTTP.
#[derive(Debug)]
pub struct HttpEngine {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpEngine {
    /// Create a new engine client.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let base_url = config.parse_url()?;

        // reqwest is built with rustls-no-provider; an `Err` means a provider
        // is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            http,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    /// Build the URL for a path given as raw segments. Each segment is
    /// percent-encoded, so ids cannot escape their position in the path.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| EngineError::Config("engine URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Pass successful responses through; turn anything else into
    /// [`EngineError::Api`] with the engine's message when it sent one.
    async fn check_status(resp: Response) -> Result<Response, EngineError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let fallback = status.canonical_reason().unwrap_or("Unknown").to_string();
        let message = match resp.bytes().await {
            Ok(body) => serde_json::from_slice::<ApiMessage>(&body).map_or_else(
                |_| {
                    let text = String::from_utf8_lossy(&body).trim().to_string();
                    if text.is_empty() { fallback } else { text }
                },
                |m| m.message,
            ),
            Err(_) => fallback,
        };
        Err(EngineError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Expose a response body as a byte source. A transport failure
    /// mid-body becomes the source's read error.
    fn body_source(resp: Response) -> ByteSource {
        let body = async_stream::stream! {
            let mut resp = resp;
            loop {
                match resp.chunk().await {
                    Ok(Some(chunk)) => yield Ok::<Bytes, io::Error>(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(io::Error::other(e));
                        break;
                    }
                }
            }
        };
        Box::new(ChunkReader::new(Box::pin(body)))
    }

    async fn open_stream(request: reqwest::RequestBuilder) -> Result<ByteSource, EngineError> {
        let resp = Self::check_status(request.send().await?).await?;
        Ok(Self::body_source(resp))
    }
}

fn flag(set: bool) -> &'static str {
    if set { "1" } else { "0" }
}

#[tonic::async_trait]
impl EngineApi for HttpEngine {
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect, EngineError> {
        let url = self.endpoint(&["containers", id, "json"])?;
        debug!(%url, "Inspecting container");
        let resp = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body = Self::check_status(resp).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn container_logs(
        &self,
        id: &str,
        options: &LogsOptions,
    ) -> Result<ByteSource, EngineError> {
        let mut url = self.endpoint(&["containers", id, "logs"])?;
        url.query_pairs_mut()
            .append_pair("follow", flag(options.follow))
            .append_pair("stdout", flag(options.stdout))
            .append_pair("stderr", flag(options.stderr))
            .append_pair("timestamps", flag(options.timestamps))
            .append_pair("tail", &options.tail);
        debug!(%url, "Opening log stream");
        Self::open_stream(self.http.get(url)).await
    }

    async fn container_stats(&self, id: &str, stream: bool) -> Result<ByteSource, EngineError> {
        let mut url = self.endpoint(&["containers", id, "stats"])?;
        url.query_pairs_mut()
            .append_pair("stream", if stream { "true" } else { "false" });
        debug!(%url, "Opening stats stream");
        Self::open_stream(self.http.get(url)).await
    }

    async fn pull_image(
        &self,
        reference: &str,
        registry_auth: Option<&str>,
    ) -> Result<ByteSource, EngineError> {
        let mut url = self.endpoint(&["images", "create"])?;
        url.query_pairs_mut().append_pair("fromImage", reference);
        debug!(%url, authenticated = registry_auth.is_some(), "Pulling image");

        let mut request = self.http.post(url);
        if let Some(auth) = registry_auth {
            let value = HeaderValue::from_str(auth)
                .map_err(|_| EngineError::InvalidArgument("invalid registry auth format".into()))?;
            request = request.header(REGISTRY_AUTH_HEADER, value);
        }
        Self::open_stream(request).await
    }

    async fn build_image(
        &self,
        context: Vec<u8>,
        options: &BuildOptions,
    ) -> Result<ByteSource, EngineError> {
        let mut url = self.endpoint(&["build"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("dockerfile", &options.dockerfile);
            for tag in &options.tags {
                query.append_pair("t", tag);
            }
            if options.no_cache {
                query.append_pair("nocache", "1");
            }
            if !options.build_args.is_empty() {
                query.append_pair("buildargs", &serde_json::to_string(&options.build_args)?);
            }
            if !options.labels.is_empty() {
                query.append_pair("labels", &serde_json::to_string(&options.labels)?);
            }
            query.append_pair("rm", "1").append_pair("forcerm", "1");
        }
        debug!(%url, context_bytes = context.len(), "Starting image build");

        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-tar")
            .body(context);
        Self::open_stream(request).await
    }
}
