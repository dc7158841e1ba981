//! Constants for the request module (timeouts, cache and progress defaults).

use std::time::Duration;

/// Default HTTP connect timeout (15 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default HTTP read timeout (5 minutes for large downloads).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default lifetime of a cached response body (60 seconds).
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(60);

/// Default minimum interval between two throttled progress notifications.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(1000);

/// Maximum number of redirects followed for one logical request.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;
