//! The HTTP transport seam.
//!
//! [`Transport`] performs exactly one HTTP exchange per call and never follows
//! redirects; the engine owns redirect, retry and cache decisions.
//! [`ReqwestTransport`] is the production implementation.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::{EngineError, RequestDescriptor, ResponseHead, TransportError};

/// Streamed response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Response returned by [`Transport::execute`]: the head plus a lazily read body.
pub struct TransportResponse {
    /// Status line and headers.
    pub head: ResponseHead,
    /// Body chunks. Dropping the stream aborts the transfer.
    pub body: BodyStream,
}

impl TransportResponse {
    /// Creates a response from a head and a body stream.
    #[must_use]
    pub fn new(head: ResponseHead, body: BodyStream) -> Self {
        Self { head, body }
    }

    /// Creates a response whose body is a single in-memory buffer.
    #[must_use]
    pub fn from_bytes(head: ResponseHead, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        let stream: BodyStream = if body.is_empty() {
            Box::pin(stream::empty())
        } else {
            Box::pin(stream::once(async move { Ok(body) }))
        };
        Self::new(head, stream)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

/// Executes one HTTP exchange.
///
/// Implementations must not follow redirects. Errors are reported through
/// [`TransportError`] so the engine can classify them for retry.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` and returns the response head with a streaming body.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response head could be obtained.
    async fn execute(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest` client with redirects disabled.
///
/// Create once and share; the underlying client pools connections.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] if the client cannot be built.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a transport with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] if the client cannot be built.
    pub fn with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, EngineError> {
        let client = build_client(connect_timeout, read_timeout)?;
        Ok(Self { client })
    }

    /// Wraps an existing client. The client must have redirects disabled.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn build_client(connect_timeout: Duration, read_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .gzip(true)
        .redirect(Policy::none())
        .user_agent(default_user_agent())
        .build()
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    async fn execute(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        let url = request.url().as_str().to_string();
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.clone(), e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");

        let head = ResponseHead {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers: response.headers().clone(),
            url: response.url().clone(),
        };

        let body_url = url;
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| TransportError::from_reqwest(body_url.clone(), e)));

        Ok(TransportResponse::new(head, Box::pin(body)))
    }
}
