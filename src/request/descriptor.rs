//! Request and response value types shared by the engine and its collaborators.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue, RANGE};
use url::Url;

use super::TransportError;

/// One HTTP request as handed to the transport.
///
/// A redirect produces a new descriptor; the only in-place mutation the engine
/// performs is the `Range` header used for resumed downloads.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Creates a descriptor for `method` and `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if `url` cannot be parsed.
    pub fn new(method: Method, url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|_| TransportError::invalid_url(url))?;
        Ok(Self::from_url(method, url))
    }

    /// Creates a descriptor from an already parsed URL.
    #[must_use]
    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a GET descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if `url` cannot be parsed.
    pub fn get(url: &str) -> Result<Self, TransportError> {
        Self::new(Method::GET, url)
    }

    /// Creates a POST descriptor carrying `body`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if `url` cannot be parsed.
    pub fn post(url: &str, body: impl Into<Bytes>) -> Result<Self, TransportError> {
        Ok(Self::new(Method::POST, url)?.with_body(body))
    }

    /// Adds (or replaces) a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns a copy targeting a different method and URL, optionally dropping the body.
    #[must_use]
    pub fn redirected(&self, method: Method, url: Url, keep_body: bool) -> Self {
        let mut headers = self.headers.clone();
        headers.remove(RANGE);
        if !keep_body {
            headers.remove(CONTENT_LENGTH);
            headers.remove(reqwest::header::CONTENT_TYPE);
        }
        Self {
            method,
            url,
            headers,
            body: if keep_body { self.body.clone() } else { None },
        }
    }

    /// Sets `Range: bytes=<offset>-`, or clears it when `offset` is zero.
    pub(crate) fn set_resume_offset(&mut self, offset: u64) {
        if offset == 0 {
            self.headers.remove(RANGE);
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&format!("bytes={offset}-")) {
            self.headers.insert(RANGE, value);
        }
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase, when the transport knows it.
    pub reason: Option<String>,
    /// Response headers.
    pub headers: HeaderMap,
    /// URL that produced this response.
    pub url: Url,
}

impl ResponseHead {
    /// Creates a head with no headers.
    #[must_use]
    pub fn new(status: u16, url: Url) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_string);
        Self {
            status,
            reason,
            headers: HeaderMap::new(),
            url,
        }
    }

    /// Returns a header value as a string, if present and valid ASCII.
    #[must_use]
    pub fn header_str(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Length` header parsed as bytes.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header_str(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
}

/// Typed payload of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Body decoded as text.
    Text(String),
    /// Body written to this file.
    File(PathBuf),
}

/// Result handed to [`RequestObserver::on_success`](super::RequestObserver::on_success).
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// Response metadata; `None` when served from cache.
    pub head: Option<ResponseHead>,
    /// Payload; `None` when a redirect could not be resolved.
    pub result: Option<ResponseBody>,
    /// Whether the result came from the response cache.
    pub from_cache: bool,
}

impl ResponseInfo {
    /// Returns the text payload, if this was a plain request.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.result {
            Some(ResponseBody::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Returns the downloaded file path, if this was a download.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.result {
            Some(ResponseBody::File(path)) => Some(path),
            _ => None,
        }
    }
}
