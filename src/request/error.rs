//! Error types for the request module.
//!
//! [`TransportError`] describes why a single attempt failed at the transport
//! layer. [`RequestFailure`] is the terminal failure record handed to the
//! observer, and [`EngineError`] covers engine construction problems.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use super::retry::FailureKind;

/// Boxed error used as an opaque cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by a [`Transport`](super::Transport) while executing one attempt
/// or while streaming its response body.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The host name could not be resolved.
    #[error("could not resolve host for {url}")]
    UnresolvedHost {
        /// The URL whose host failed to resolve.
        url: String,
        /// The underlying resolver error, when available.
        #[source]
        source: Option<BoxError>,
    },

    /// The TCP/TLS connection was not established in time.
    #[error("connect timeout for {url}")]
    ConnectTimeout {
        /// The URL that timed out.
        url: String,
    },

    /// The server stopped sending data before the read timeout elapsed.
    #[error("read timeout for {url}")]
    ReadTimeout {
        /// The URL that timed out.
        url: String,
    },

    /// Connection-level IO failure (refused, reset, truncated body, ...).
    #[error("network error for {url}: {source}")]
    Network {
        /// The URL being requested.
        url: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// The request URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Any other transport fault (request construction, protocol violations).
    #[error("request to {url} failed: {message}")]
    Other {
        /// The URL being requested.
        url: String,
        /// Description of the fault.
        message: String,
    },
}

impl TransportError {
    /// Creates an unresolved-host error without an underlying cause.
    pub fn unresolved_host(url: impl Into<String>) -> Self {
        Self::UnresolvedHost {
            url: url.into(),
            source: None,
        }
    }

    /// Creates a connect timeout error.
    pub fn connect_timeout(url: impl Into<String>) -> Self {
        Self::ConnectTimeout { url: url.into() }
    }

    /// Creates a read timeout error.
    pub fn read_timeout(url: impl Into<String>) -> Self {
        Self::ReadTimeout { url: url.into() }
    }

    /// Creates a network error from any error source.
    pub fn network(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a catch-all transport error.
    pub fn other(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Maps a reqwest error onto the transport taxonomy.
    ///
    /// reqwest does not expose DNS failures as a distinct kind, so the error
    /// chain is inspected for resolver messages.
    pub fn from_reqwest(url: impl Into<String>, error: reqwest::Error) -> Self {
        let url = url.into();
        if error.is_builder() {
            return Self::other(url, error.to_string());
        }
        if error.is_connect() {
            if error.is_timeout() {
                return Self::ConnectTimeout { url };
            }
            if is_dns_error(&error) {
                return Self::UnresolvedHost {
                    url,
                    source: Some(Box::new(error)),
                };
            }
            return Self::network(url, error);
        }
        if error.is_timeout() {
            return Self::ReadTimeout { url };
        }
        if error.is_body() || error.is_decode() || error.is_request() {
            return Self::network(url, error);
        }
        Self::other(url, error.to_string())
    }
}

/// Walks the source chain looking for resolver failure messages.
fn is_dns_error(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return true;
        }
        current = err.source();
    }
    false
}

/// Terminal failure record delivered to
/// [`RequestObserver::on_failure`](super::RequestObserver::on_failure).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RequestFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable description.
    pub message: String,
    /// Underlying cause, if any.
    #[source]
    pub cause: Option<BoxError>,
}

impl RequestFailure {
    /// Creates a failure record without an underlying cause.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Builds the record for a transport error whose retry budget ran out.
    pub fn from_transport(kind: FailureKind, error: TransportError) -> Self {
        Self {
            kind,
            message: error.to_string(),
            cause: Some(Box::new(error)),
        }
    }

    /// Builds the record for a non-success, non-redirect HTTP status.
    pub fn http_status(status: u16, reason: Option<&str>) -> Self {
        let message = match reason {
            Some(reason) if !reason.is_empty() => format!("HTTP {status} {reason}"),
            _ => format!("HTTP {status}"),
        };
        Self::new(FailureKind::HttpStatus(status), message)
    }

    /// Builds the record for HTTP 416 on a resumed download.
    pub fn range_already_complete() -> Self {
        Self::new(
            FailureKind::RangeAlreadyComplete,
            "HTTP 416 range not satisfiable: the file may already be fully downloaded",
        )
    }

    /// Builds the record for a local file error at the save path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self {
            kind: FailureKind::Other,
            message: format!("IO error at {}: {source}", path.display()),
            cause: Some(Box::new(source)),
        }
    }
}

/// Outcome of an attempt that did not produce a result.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Transport fault; offered to the retry handler.
    Transport(TransportError),
    /// Terminal failure that is never retried.
    Fatal(RequestFailure),
    /// Cancellation observed mid-attempt.
    Cancelled,
}

impl From<TransportError> for AttemptError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl From<RequestFailure> for AttemptError {
    fn from(failure: RequestFailure) -> Self {
        Self::Fatal(failure)
    }
}

/// Errors that can occur while assembling an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The reqwest client could not be built.
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// Settings JSON could not be parsed.
    #[error("invalid engine settings: {0}")]
    Settings(#[from] serde_json::Error),

    /// A cacheable method name is not a valid HTTP method.
    #[error("invalid HTTP method in settings: {method}")]
    InvalidMethod {
        /// The offending method string.
        method: String,
    },
}
