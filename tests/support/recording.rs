//! Observer that records every callback it receives.

use std::sync::Mutex;
use std::time::Duration;

use request_engine::request::{FailureKind, RequestFailure, RequestObserver, ResponseInfo};

/// One recorded callback.
#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Loading { total: u64, current: u64 },
    Success(ResponseInfo),
    Failure { kind: FailureKind, message: String },
    Cancelled,
}

#[derive(Debug)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
    interval: Duration,
}

impl Default for RecordingObserver {
    fn default() -> Self {
        Self::with_interval(Duration::ZERO)
    }
}

impl RecordingObserver {
    /// Records with the given progress throttle interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            interval,
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.count(|e| matches!(e, Event::Start))
    }

    pub fn cancellations(&self) -> usize {
        self.count(|e| matches!(e, Event::Cancelled))
    }

    pub fn progress(&self) -> Vec<(u64, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Loading { total, current } => Some((total, current)),
                _ => None,
            })
            .collect()
    }

    /// The single success payload, if the request succeeded.
    pub fn success(&self) -> Option<ResponseInfo> {
        self.events().into_iter().find_map(|e| match e {
            Event::Success(info) => Some(info),
            _ => None,
        })
    }

    pub fn failure(&self) -> Option<(FailureKind, String)> {
        self.events().into_iter().find_map(|e| match e {
            Event::Failure { kind, message } => Some((kind, message)),
            _ => None,
        })
    }

    /// Number of success + failure + cancelled callbacks.
    pub fn terminal_count(&self) -> usize {
        self.count(|e| {
            matches!(
                e,
                Event::Success(_) | Event::Failure { .. } | Event::Cancelled
            )
        })
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl RequestObserver for RecordingObserver {
    fn on_start(&self) {
        self.push(Event::Start);
    }

    fn on_loading(&self, total: u64, current: u64, _is_uploading: bool) {
        self.push(Event::Loading { total, current });
    }

    fn on_success(&self, info: ResponseInfo) {
        self.push(Event::Success(info));
    }

    fn on_failure(&self, failure: RequestFailure) {
        self.push(Event::Failure {
            kind: failure.kind,
            message: failure.message,
        });
    }

    fn on_cancelled(&self) {
        self.push(Event::Cancelled);
    }

    fn min_progress_interval(&self) -> Duration {
        self.interval
    }
}
