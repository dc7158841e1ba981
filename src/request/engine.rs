//! Request engine: drives one request through its lifecycle.
//!
//! A [`RequestEngine`] is single-use. [`start`](RequestEngine::start) spawns a
//! worker task that runs the send loop (cache short-circuit, transport call,
//! retry, redirects, body handling) and a dispatcher task that delivers
//! events to the [`RequestObserver`] one at a time, in order.
//!
//! # State machine
//!
//! ```text
//! Waiting --start--> Started --progress--> Loading (repeats)
//!    |                  |                     |
//!    |                  +----> Success | Failure <----+
//!    +------------------+---------> Cancelled (from any non-terminal state)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use request_engine::request::{
//!     EngineServices, EngineSettings, RequestDescriptor, RequestEngine, RequestFailure,
//!     RequestObserver, ResponseInfo,
//! };
//!
//! struct Printer;
//!
//! impl RequestObserver for Printer {
//!     fn on_success(&self, info: ResponseInfo) {
//!         println!("{:?}", info.text());
//!     }
//!     fn on_failure(&self, failure: RequestFailure) {
//!         eprintln!("{failure}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let services = EngineServices::from_settings(&EngineSettings::default())?;
//! let engine = RequestEngine::new(services, Arc::new(Printer));
//! engine.start(RequestDescriptor::get("https://example.com/")?, None);
//! engine.join().await;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::cache::expiry_from_now;
use super::cancel::CancelSignal;
use super::error::AttemptError;
use super::observer::EngineEvent;
use super::progress::ProgressReporter;
use super::redirect::is_redirect;
use super::resume::receive_file;
use super::retry::{FailureKind, RetryDecision, classify_error};
use super::transport::{BodyStream, TransportResponse};
use super::{
    DownloadTarget, EngineServices, RequestDescriptor, RequestFailure, RequestObserver,
    ResponseBody, ResponseHead, ResponseInfo,
};

/// Lifecycle state of a [`RequestEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Created, not started.
    Waiting,
    /// `start` accepted the request.
    Started,
    /// Body transfer in progress.
    Loading,
    /// Completed successfully.
    Success,
    /// Failed terminally.
    Failure,
    /// Cancelled by the caller.
    Cancelled,
}

impl RequestState {
    /// Returns true for `Success`, `Failure` and `Cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

/// Executes one logical HTTP request and reports to an observer.
///
/// `start` and `cancel` may be called from any thread; `start` must run
/// inside a Tokio runtime.
pub struct RequestEngine {
    services: EngineServices,
    observer: Arc<dyn RequestObserver>,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    cancel: CancelSignal,
}

struct Lifecycle {
    state: RequestState,
    events: Option<UnboundedSender<EngineEvent>>,
    dispatcher: Option<JoinHandle<()>>,
    url: Option<Url>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: RequestState::Waiting,
            events: None,
            dispatcher: None,
            url: None,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the transition carried by `event`. Returns false if the event must be dropped.
    fn apply(&self, event: &EngineEvent) -> bool {
        let mut lifecycle = self.lock();
        match event {
            EngineEvent::Cancelled => {
                lifecycle.events = None;
                true
            }
            _ if lifecycle.state == RequestState::Cancelled => false,
            EngineEvent::Started => true,
            EngineEvent::Loading { .. } => {
                lifecycle.state = RequestState::Loading;
                true
            }
            EngineEvent::Success(_) => {
                lifecycle.state = RequestState::Success;
                lifecycle.events = None;
                true
            }
            EngineEvent::Failure(_) => {
                lifecycle.state = RequestState::Failure;
                lifecycle.events = None;
                true
            }
        }
    }
}

impl RequestEngine {
    /// Creates an engine in the `Waiting` state.
    #[must_use]
    pub fn new(services: EngineServices, observer: Arc<dyn RequestObserver>) -> Self {
        Self {
            services,
            observer,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Starts the request. With `download`, the body is written to the target file.
    ///
    /// Silently ignored when the engine was cancelled or already started.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self, descriptor: RequestDescriptor, download: Option<DownloadTarget>) {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut lifecycle = self.shared.lock();
            if lifecycle.state != RequestState::Waiting {
                debug!(state = ?lifecycle.state, "start ignored");
                return;
            }
            lifecycle.state = RequestState::Started;
            lifecycle.url = Some(descriptor.url().clone());
            lifecycle.events = Some(tx.clone());
            lifecycle.dispatcher = Some(tokio::spawn(dispatch(
                rx,
                Arc::clone(&self.observer),
                Arc::clone(&self.shared),
            )));
        }

        // first event in the queue; the worker cannot have sent anything yet
        let _ = tx.send(EngineEvent::Started);

        let worker = Worker {
            services: self.services.clone(),
            cancel: self.shared.cancel.clone(),
            events: tx.clone(),
            download,
            min_interval: self.observer.min_progress_interval(),
        };
        let cancel = self.shared.cancel.clone();
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(worker.run(descriptor))
                .catch_unwind()
                .await;
            let event = match outcome {
                Ok(Ok(info)) => EngineEvent::Success(info),
                Ok(Err(AttemptError::Fatal(failure))) => EngineEvent::Failure(failure),
                Ok(Err(AttemptError::Transport(error))) => {
                    EngineEvent::Failure(RequestFailure::from_transport(classify_error(&error), error))
                }
                Ok(Err(AttemptError::Cancelled)) => return,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(%message, "request worker panicked");
                    EngineEvent::Failure(RequestFailure::new(
                        FailureKind::Other,
                        format!("unexpected error while handling response: {message}"),
                    ))
                }
            };
            if cancel.is_cancelled() {
                return;
            }
            let _ = tx.send(event);
        });
    }

    /// Cancels the request. Idempotent; a no-op once a terminal state is reached.
    ///
    /// The observer receives exactly one `on_cancelled`, and no success or
    /// failure afterwards.
    pub fn cancel(&self) {
        let events = {
            let mut lifecycle = self.shared.lock();
            if lifecycle.state.is_terminal() {
                return;
            }
            lifecycle.state = RequestState::Cancelled;
            lifecycle.events.clone()
        };

        self.shared.cancel.cancel();
        info!(url = ?self.request_url().map(|u| u.to_string()), "request cancelled");

        match events {
            Some(events) => {
                if events.send(EngineEvent::Cancelled).is_err() {
                    debug!("dispatcher already stopped");
                }
            }
            // never started: no dispatcher to deliver through
            None => self.observer.on_cancelled(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.shared.lock().state
    }

    /// URL passed to `start`, if started.
    #[must_use]
    pub fn request_url(&self) -> Option<Url> {
        self.shared.lock().url.clone()
    }

    /// Waits until the terminal callback has been delivered.
    ///
    /// Returns immediately if the engine was never started or was already joined.
    pub async fn join(&self) {
        let handle = self.shared.lock().dispatcher.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "dispatcher task failed");
        }
    }
}

impl std::fmt::Debug for RequestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEngine")
            .field("state", &self.state())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Delivers queued events to the observer until a terminal one is delivered.
async fn dispatch(
    mut events: UnboundedReceiver<EngineEvent>,
    observer: Arc<dyn RequestObserver>,
    shared: Arc<Shared>,
) {
    while let Some(event) = events.recv().await {
        if !shared.apply(&event) {
            continue;
        }
        let terminal = event.is_terminal();
        event.deliver(observer.as_ref());
        if terminal {
            break;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// What one attempt produced when it did not fail.
enum Step {
    Done(ResponseInfo),
    Redirect(RequestDescriptor),
}

/// Runs the send loop on the worker task.
struct Worker {
    services: EngineServices,
    cancel: CancelSignal,
    events: UnboundedSender<EngineEvent>,
    download: Option<DownloadTarget>,
    min_interval: std::time::Duration,
}

impl Worker {
    #[instrument(skip_all, fields(method = %descriptor.method(), url = %descriptor.url()))]
    async fn run(self, descriptor: RequestDescriptor) -> Result<ResponseInfo, AttemptError> {
        let cache_key = descriptor.url().to_string();
        let mut reporter =
            ProgressReporter::new(self.min_interval, self.cancel.clone(), self.events.clone());
        let mut request = descriptor;
        let mut failures: u32 = 0;
        let mut redirects: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AttemptError::Cancelled);
            }

            if let Some(text) = self.cached(&request, &cache_key) {
                debug!(key = %cache_key, "served from cache");
                return Ok(ResponseInfo {
                    head: None,
                    result: Some(ResponseBody::Text(text)),
                    from_cache: true,
                });
            }

            // without auto_resume the caller owns the Range header
            let resume_offset = match &self.download {
                Some(target) if target.auto_resume => {
                    let offset = target.resume_offset().await;
                    request.set_resume_offset(offset);
                    offset
                }
                _ => 0,
            };

            match self
                .attempt(&request, &cache_key, resume_offset, &mut reporter)
                .await
            {
                Ok(Step::Done(info)) => return Ok(info),
                Ok(Step::Redirect(next)) => {
                    redirects += 1;
                    if redirects > self.services.max_redirects {
                        return Err(RequestFailure::new(
                            FailureKind::Other,
                            format!(
                                "too many redirects ({} allowed)",
                                self.services.max_redirects
                            ),
                        )
                        .into());
                    }
                    debug!(to = %next.url(), redirects, "following redirect");
                    request = next;
                }
                Err(AttemptError::Transport(error)) => {
                    failures += 1;
                    let kind = classify_error(&error);
                    warn!(attempt = failures, %kind, error = %error, "attempt failed");
                    match self.services.retry.should_retry(kind, failures) {
                        RetryDecision::Retry { delay, attempt } => {
                            info!(next_attempt = attempt, delay_ms = delay.as_millis(), "retrying");
                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
                            }
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(%reason, "giving up");
                            return Err(RequestFailure::from_transport(kind, error).into());
                        }
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Cache hit for plain requests whose method has caching enabled.
    fn cached(&self, request: &RequestDescriptor, key: &str) -> Option<String> {
        if self.download.is_some() {
            return None;
        }
        let cache = self.services.cache.as_ref()?;
        if !cache.is_enabled(request.method()) {
            return None;
        }
        cache.get(key)
    }

    async fn attempt(
        &self,
        request: &RequestDescriptor,
        cache_key: &str,
        resume_offset: u64,
        reporter: &mut ProgressReporter,
    ) -> Result<Step, AttemptError> {
        let response = tokio::select! {
            response = self.services.transport.execute(request) => response?,
            () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
        };
        let TransportResponse { head, body } = response;
        debug!(status = head.status, "attempt answered");

        match head.status {
            status if status < 300 => {
                let result = match &self.download {
                    Some(target) => {
                        let path =
                            receive_file(target, resume_offset, &head, body, reporter, &self.cancel)
                                .await?;
                        ResponseBody::File(path)
                    }
                    None => {
                        let text = self.receive_text(&head, body, reporter).await?;
                        self.store(request, cache_key, &text);
                        ResponseBody::Text(text)
                    }
                };
                Ok(Step::Done(ResponseInfo {
                    head: Some(head),
                    result: Some(result),
                    from_cache: false,
                }))
            }
            status if is_redirect(status) => {
                match self.services.redirect.redirect_request(request, &head) {
                    Some(next) => Ok(Step::Redirect(next)),
                    None => {
                        debug!(status, "redirect not followed");
                        Ok(Step::Done(ResponseInfo {
                            head: Some(head),
                            result: None,
                            from_cache: false,
                        }))
                    }
                }
            }
            416 => Err(RequestFailure::range_already_complete().into()),
            status => Err(RequestFailure::http_status(status, head.reason.as_deref()).into()),
        }
    }

    /// Reads the whole body as UTF-8 text (lossy), reporting progress.
    async fn receive_text(
        &self,
        head: &ResponseHead,
        mut body: BodyStream,
        reporter: &mut ProgressReporter,
    ) -> Result<String, AttemptError> {
        let total = head.content_length().unwrap_or(0);
        let mut buffer = Vec::with_capacity(usize::try_from(total).unwrap_or(0).min(1 << 20));
        reporter.report(total, 0, true);

        loop {
            if self.cancel.is_cancelled() {
                return Err(AttemptError::Cancelled);
            }
            let chunk = tokio::select! {
                chunk = body.next() => chunk,
                () = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
            };
            let Some(chunk) = chunk else {
                break;
            };
            buffer.extend_from_slice(&chunk?);
            reporter.report(total, buffer.len() as u64, false);
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn store(&self, request: &RequestDescriptor, key: &str, text: &str) {
        let Some(cache) = &self.services.cache else {
            return;
        };
        if cache.is_enabled(request.method()) {
            cache.put(key, text.to_string(), expiry_from_now(self.services.cache_expiry));
            debug!(%key, expiry_secs = self.services.cache_expiry.as_secs(), "stored in cache");
        }
    }
}
