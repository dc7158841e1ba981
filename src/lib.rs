//! Request Engine Library
//!
//! An asynchronous HTTP request execution engine: one request per engine,
//! driven through retry, redirects, a shared response cache, throttled
//! progress reporting and resumable downloads, with cooperative cancellation.
//!
//! # Architecture
//!
//! Everything lives in [`request`]:
//! - [`request::RequestEngine`] - lifecycle orchestrator and observer dispatch
//! - [`request::Transport`] - one HTTP exchange, reqwest-backed by default
//! - [`request::RetryPolicy`] / [`request::classify_error`] - retry decisions
//! - [`request::ResponseCache`] - shared text cache with expiry
//! - [`request::DownloadTarget`] - resumable file downloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod request;

// Re-export commonly used types
pub use request::{
    DownloadTarget, EngineError, EngineServices, EngineSettings, FailureKind, RequestDescriptor,
    RequestEngine, RequestFailure, RequestObserver, RequestState, ResponseCache, ResponseInfo,
    RetryDecision, RetryPolicy, TransportError, classify_error,
};
