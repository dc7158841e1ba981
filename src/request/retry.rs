//! Failure classification and retry strategies for transport failures.
//!
//! When an attempt fails at the transport layer, the error is classified into a
//! [`FailureKind`] by [`classify_error`]:
//! - [`FailureKind::UnresolvedHost`] - DNS resolution failed
//! - [`FailureKind::ConnectTimeout`] - the connection was not established in time
//! - [`FailureKind::ReadTimeoutOrIo`] - read timeout or connection-level IO failure
//! - [`FailureKind::Other`] - anything else
//!
//! The engine then asks its [`RetryHandler`] whether to try again. HTTP status
//! outcomes never reach the handler; they are protocol results, not faults.
//!
//! # Example
//!
//! ```
//! use request_engine::request::{
//!     FailureKind, RetryDecision, RetryHandler, RetryPolicy, TransportError, classify_error,
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = TransportError::connect_timeout("https://example.com/data.json");
//! let kind = classify_error(&error);
//! assert_eq!(kind, FailureKind::ConnectTimeout);
//!
//! match policy.should_retry(kind, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::TransportError;

/// Default maximum attempts (including the first one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
pub(crate) const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
pub(crate) const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
pub(crate) const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The host name could not be resolved.
    UnresolvedHost,

    /// The connection could not be established before the connect timeout.
    ConnectTimeout,

    /// Read timeout or connection-level IO error.
    ReadTimeoutOrIo,

    /// The server answered with a non-success, non-redirect status.
    HttpStatus(u16),

    /// HTTP 416 on a ranged request; the file is likely complete already.
    RangeAlreadyComplete,

    /// Anything else, including local file errors and internal faults.
    Other,
}

impl FailureKind {
    /// Returns true for categories that describe a transport fault.
    #[must_use]
    pub fn is_transport(self) -> bool {
        matches!(
            self,
            Self::UnresolvedHost | Self::ConnectTimeout | Self::ReadTimeoutOrIo
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedHost => f.write_str("unresolved host"),
            Self::ConnectTimeout => f.write_str("connect timeout"),
            Self::ReadTimeoutOrIo => f.write_str("read timeout or IO error"),
            Self::HttpStatus(status) => write!(f, "HTTP status {status}"),
            Self::RangeAlreadyComplete => f.write_str("range already complete"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

impl RetryDecision {
    /// Returns true if the decision approves another attempt.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Pluggable retry strategy consulted after every transport failure.
///
/// `attempt` is the 1-indexed number of the attempt that just failed; the
/// engine passes strictly increasing values and stops calling the network
/// once a handler returns [`RetryDecision::DoNotRetry`].
pub trait RetryHandler: Send + Sync + fmt::Debug {
    /// Decides whether the failed attempt should be retried.
    fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision;
}

/// Retry strategy that always gives up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryHandler for NeverRetry {
    fn should_retry(&self, kind: FailureKind, _attempt: u32) -> RetryDecision {
        RetryDecision::DoNotRetry {
            reason: format!("retries disabled ({kind})"),
        }
    }
}

/// Bounded retry strategy with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 1 second
/// - `max_delay`: 32 seconds
/// - `backoff_multiplier`: 2.0
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt - 1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt.
    backoff_multiplier: f32,

    /// Whether random jitter is added to each delay.
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            jitter: true,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Creates a policy that retries immediately (no backoff, no jitter).
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculates the delay for a retry attempt with exponential backoff and jitter.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        // attempt 1 = multiplier^0
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter = if self.jitter {
            calculate_jitter()
        } else {
            Duration::ZERO
        };

        Duration::from_millis(capped_ms as u64) + jitter
    }
}

impl RetryHandler for RetryPolicy {
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if !kind.is_transport() {
            return RetryDecision::DoNotRetry {
                reason: format!("{kind} is not retryable"),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Random jitter between 0 and `MAX_JITTER`.
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}

/// Classifies a transport error into a failure category.
///
/// | Error | Kind |
/// |-------|------|
/// | UnresolvedHost | UnresolvedHost |
/// | ConnectTimeout | ConnectTimeout |
/// | ReadTimeout | ReadTimeoutOrIo |
/// | Network | ReadTimeoutOrIo |
/// | InvalidUrl | Other |
/// | Other | Other |
#[instrument(level = "debug")]
pub fn classify_error(error: &TransportError) -> FailureKind {
    match error {
        TransportError::UnresolvedHost { .. } => FailureKind::UnresolvedHost,
        TransportError::ConnectTimeout { .. } => FailureKind::ConnectTimeout,
        TransportError::ReadTimeout { .. } | TransportError::Network { .. } => {
            FailureKind::ReadTimeoutOrIo
        }
        TransportError::InvalidUrl { .. } | TransportError::Other { .. } => FailureKind::Other,
    }
}
