//! Engine configuration: serializable settings and the collaborator bundle built from them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CACHE_EXPIRY, DEFAULT_MAX_REDIRECTS, READ_TIMEOUT_SECS,
};
use super::retry::{DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
use super::{
    DefaultRedirectHandler, EngineError, RedirectHandler, ReqwestTransport, ResponseCache,
    RetryHandler, RetryPolicy, Transport,
};

/// Tunables for an engine, loadable from JSON.
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Attempts per request including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f32,
    pub cache_expiry_secs: u64,
    /// Methods whose responses are cached. Empty disables caching.
    pub cacheable_methods: Vec<String>,
    pub max_redirects: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: duration_millis(DEFAULT_BASE_DELAY),
            max_delay_ms: duration_millis(DEFAULT_MAX_DELAY),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            cache_expiry_secs: DEFAULT_CACHE_EXPIRY.as_secs(),
            cacheable_methods: vec![Method::GET.to_string()],
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl EngineSettings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Settings`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the `{method: enabled}` table for the response cache.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidMethod`] for a name that is not an HTTP method.
    pub fn cache_methods(&self) -> Result<HashMap<Method, bool>, EngineError> {
        self.cacheable_methods
            .iter()
            .map(|name| {
                Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
                    .map(|method| (method, true))
                    .map_err(|_| EngineError::InvalidMethod {
                        method: name.clone(),
                    })
            })
            .collect()
    }

    /// Builds the retry policy described by these settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }

    #[must_use]
    pub fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }
}

/// Collaborators shared by engines: transport, cache, retry and redirect strategies.
///
/// Cheap to clone; every collaborator is reference counted so one bundle can
/// back many concurrent engines.
#[derive(Debug, Clone)]
pub struct EngineServices {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: Option<Arc<ResponseCache>>,
    pub(crate) retry: Arc<dyn RetryHandler>,
    pub(crate) redirect: Arc<dyn RedirectHandler>,
    pub(crate) cache_expiry: Duration,
    pub(crate) max_redirects: u32,
}

impl EngineServices {
    /// Creates a bundle around `transport` with the default retry policy,
    /// default redirect handling and no cache.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            retry: Arc::new(RetryPolicy::default()),
            redirect: Arc::new(DefaultRedirectHandler),
            cache_expiry: DEFAULT_CACHE_EXPIRY,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Builds a reqwest-backed bundle from settings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the HTTP client cannot be built or a
    /// cacheable method name is invalid.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, EngineError> {
        let transport = ReqwestTransport::with_timeouts(
            Duration::from_secs(settings.connect_timeout_secs),
            Duration::from_secs(settings.read_timeout_secs),
        )?;
        let methods = settings.cache_methods()?;
        let cache = (!methods.is_empty()).then(|| {
            Arc::new(ResponseCache::with_methods(methods).with_default_expiry(settings.cache_expiry()))
        });

        Ok(Self {
            transport: Arc::new(transport),
            cache,
            retry: Arc::new(settings.retry_policy()),
            redirect: Arc::new(DefaultRedirectHandler),
            cache_expiry: settings.cache_expiry(),
            max_redirects: settings.max_redirects,
        })
    }

    #[must_use]
    pub fn with_retry_handler(mut self, retry: Arc<dyn RetryHandler>) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_redirect_handler(mut self, redirect: Arc<dyn RedirectHandler>) -> Self {
        self.redirect = redirect;
        self
    }

    /// Attaches a (usually process-wide) response cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache_expiry = cache.default_expiry();
        self.cache = Some(cache);
        self
    }

    /// Lifetime of entries this engine stores, overriding the cache default.
    #[must_use]
    pub fn with_cache_expiry(mut self, expiry: Duration) -> Self {
        self.cache_expiry = expiry;
        self
    }

    /// Redirects followed before the request fails with "too many redirects".
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// The shared cache, if any.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }
}
