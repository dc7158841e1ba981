//! Throttled progress reporting from the worker to the observer.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use super::cancel::CancelSignal;
use super::observer::EngineEvent;

/// Rate-limits progress samples crossing the worker → observer boundary.
///
/// A sample is emitted when forced, or when at least `min_interval` has passed
/// since the previous emission. Nothing is emitted once the request is
/// cancelled.
#[derive(Debug)]
pub(crate) struct ProgressReporter {
    min_interval: Duration,
    last_emit: Instant,
    cancel: CancelSignal,
    events: UnboundedSender<EngineEvent>,
}

impl ProgressReporter {
    pub(crate) fn new(
        min_interval: Duration,
        cancel: CancelSignal,
        events: UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            min_interval,
            last_emit: Instant::now(),
            cancel,
            events,
        }
    }

    /// Reports a download-direction sample. Returns whether it was emitted.
    pub(crate) fn report(&mut self, total: u64, current: u64, force: bool) -> bool {
        self.report_at(total, current, force, Instant::now())
    }

    pub(crate) fn report_at(&mut self, total: u64, current: u64, force: bool, now: Instant) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !force && now.saturating_duration_since(self.last_emit) < self.min_interval {
            return false;
        }
        self.last_emit = now;
        self.events
            .send(EngineEvent::Loading {
                total,
                current,
                is_uploading: false,
            })
            .is_ok()
    }
}
