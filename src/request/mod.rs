//! Asynchronous HTTP request engine.
//!
//! This module drives a single logical HTTP request through its lifecycle:
//! transport call, failure classification and retry, redirect resolution,
//! response caching, throttled progress reporting and resumable file
//! downloads, with cooperative cancellation throughout.
//!
//! # Features
//!
//! - One worker task per request, with observer callbacks delivered in order
//!   from a single dispatcher task
//! - Pluggable [`Transport`], [`RetryHandler`] and [`RedirectHandler`]
//! - Shared [`ResponseCache`] with per-method enablement and expiry
//! - Resumable downloads via `Range` requests, with optional rename from
//!   `Content-Disposition`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use request_engine::request::{
//!     DownloadTarget, EngineServices, EngineSettings, RequestDescriptor, RequestEngine,
//!     RequestFailure, RequestObserver, ResponseInfo,
//! };
//!
//! struct Log;
//!
//! impl RequestObserver for Log {
//!     fn on_loading(&self, total: u64, current: u64, _is_uploading: bool) {
//!         println!("{current}/{total}");
//!     }
//!     fn on_success(&self, info: ResponseInfo) {
//!         println!("saved to {:?}", info.path());
//!     }
//!     fn on_failure(&self, failure: RequestFailure) {
//!         eprintln!("{failure}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let services = EngineServices::from_settings(&EngineSettings::default())?;
//! let engine = RequestEngine::new(services, Arc::new(Log));
//! let target = DownloadTarget::new("./paper.pdf").with_auto_resume(true);
//! engine.start(RequestDescriptor::get("https://example.com/paper.pdf")?, Some(target));
//! engine.join().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod cancel;
mod config;
pub mod constants;
mod descriptor;
mod engine;
mod error;
mod filename;
mod observer;
mod progress;
mod redirect;
mod resume;
mod retry;
mod transport;

pub use cache::ResponseCache;
pub use config::{EngineServices, EngineSettings};
pub use descriptor::{RequestDescriptor, ResponseBody, ResponseHead, ResponseInfo};
pub use engine::{RequestEngine, RequestState};
pub use error::{BoxError, EngineError, RequestFailure, TransportError};
pub use observer::RequestObserver;
pub use redirect::{DefaultRedirectHandler, NoRedirect, RedirectHandler, is_redirect};
pub use resume::DownloadTarget;
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, FailureKind, NeverRetry, RetryDecision, RetryHandler, RetryPolicy,
    classify_error,
};
pub use transport::{BodyStream, ReqwestTransport, Transport, TransportResponse};

// No module-local Result alias: signatures spell out `Result<T, TransportError>`
// or `Result<T, EngineError>`.
