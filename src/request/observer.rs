//! Observer callbacks and the events that carry them across the worker boundary.

use std::time::Duration;

use super::constants::DEFAULT_PROGRESS_INTERVAL;
use super::{RequestFailure, ResponseInfo};

/// Receives lifecycle notifications for one engine.
///
/// Callbacks for one engine are delivered in order from a single dispatcher
/// task and never overlap. After `on_cancelled`, neither `on_success` nor
/// `on_failure` is delivered.
pub trait RequestObserver: Send + Sync {
    /// The request was started.
    fn on_start(&self) {}

    /// Progress sample. `total` is best-effort and may be 0 when unknown.
    fn on_loading(&self, _total: u64, _current: u64, _is_uploading: bool) {}

    /// The request completed successfully.
    fn on_success(&self, info: ResponseInfo);

    /// The request failed terminally.
    fn on_failure(&self, failure: RequestFailure);

    /// The request was cancelled.
    fn on_cancelled(&self) {}

    /// Minimum time between two throttled progress notifications.
    fn min_progress_interval(&self) -> Duration {
        DEFAULT_PROGRESS_INTERVAL
    }
}

/// Event queued by the worker (or by `cancel`) for the dispatcher.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    Started,
    Loading {
        total: u64,
        current: u64,
        is_uploading: bool,
    },
    Success(ResponseInfo),
    Failure(RequestFailure),
    Cancelled,
}

impl EngineEvent {
    /// Terminal events end the dispatcher loop once delivered.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failure(_) | Self::Cancelled)
    }

    /// Invokes the matching observer callback.
    pub(crate) fn deliver(self, observer: &dyn RequestObserver) {
        match self {
            Self::Started => observer.on_start(),
            Self::Loading {
                total,
                current,
                is_uploading,
            } => observer.on_loading(total, current, is_uploading),
            Self::Success(info) => observer.on_success(info),
            Self::Failure(failure) => observer.on_failure(failure),
            Self::Cancelled => observer.on_cancelled(),
        }
    }
}
