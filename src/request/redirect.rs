//! Redirect resolution.
//!
//! The transport never follows redirects itself; the engine hands every
//! redirect response to a [`RedirectHandler`] and decides whether to send the
//! follow-up request.

use std::fmt;

use reqwest::Method;
use reqwest::header::LOCATION;
use tracing::{debug, warn};

use super::{RequestDescriptor, ResponseHead};

/// Returns true for statuses the engine treats as redirects.
#[must_use]
pub fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Pluggable redirect strategy.
pub trait RedirectHandler: Send + Sync + fmt::Debug {
    /// Produces the follow-up request for a redirect response, or `None` to stop.
    fn redirect_request(
        &self,
        request: &RequestDescriptor,
        response: &ResponseHead,
    ) -> Option<RequestDescriptor>;
}

/// Standard redirect semantics based on the `Location` header.
///
/// - 301/302/303 downgrade to GET (dropping the body) unless the method is GET or HEAD
/// - 307/308 preserve method and body
/// - relative locations resolve against the URL that produced the response
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRedirectHandler;

impl RedirectHandler for DefaultRedirectHandler {
    fn redirect_request(
        &self,
        request: &RequestDescriptor,
        response: &ResponseHead,
    ) -> Option<RequestDescriptor> {
        let Some(location) = response.header_str(LOCATION) else {
            warn!(status = response.status, url = %response.url, "redirect without Location header");
            return None;
        };

        let target = match response.url.join(location) {
            Ok(target) => target,
            Err(e) => {
                warn!(location, error = %e, "unparseable redirect Location");
                return None;
            }
        };

        let method = request.method();
        let (next_method, keep_body) = match response.status {
            307 | 308 => (method.clone(), true),
            301..=303 if *method == Method::GET || *method == Method::HEAD => {
                (method.clone(), false)
            }
            301..=303 => (Method::GET, false),
            _ => return None,
        };

        debug!(
            from = %request.url(),
            to = %target,
            method = %next_method,
            "following redirect"
        );
        Some(request.redirected(next_method, target, keep_body))
    }
}

/// Redirect strategy that never follows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRedirect;

impl RedirectHandler for NoRedirect {
    fn redirect_request(
        &self,
        _request: &RequestDescriptor,
        _response: &ResponseHead,
    ) -> Option<RequestDescriptor> {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderValue;
    use url::Url;

    use super::*;

    fn redirect_head(status: u16, from: &str, location: Option<&'static str>) -> ResponseHead {
        let mut head = ResponseHead::new(status, Url::parse(from).unwrap());
        if let Some(location) = location {
            head.headers
                .insert(LOCATION, HeaderValue::from_static(location));
        }
        head
    }

    #[test]
    fn test_is_redirect_statuses() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status), "{status} should redirect");
        }
        for status in [200, 300, 304, 305, 400] {
            assert!(!is_redirect(status), "{status} should not redirect");
        }
    }

    #[test]
    fn test_relative_location_resolves_against_response_url() {
        let request = RequestDescriptor::get("https://example.com/a").unwrap();
        let head = redirect_head(302, "https://example.com/a", Some("/b"));

        let next = DefaultRedirectHandler
            .redirect_request(&request, &head)
            .unwrap();
        assert_eq!(next.url().as_str(), "https://example.com/b");
        assert_eq!(*next.method(), Method::GET);
    }

    #[test]
    fn test_absolute_location() {
        let request = RequestDescriptor::get("https://example.com/a").unwrap();
        let head = redirect_head(301, "https://example.com/a", Some("https://mirror.example.org/x"));

        let next = DefaultRedirectHandler
            .redirect_request(&request, &head)
            .unwrap();
        assert_eq!(next.url().as_str(), "https://mirror.example.org/x");
    }

    #[test]
    fn test_post_downgrades_to_get_on_302() {
        let request = RequestDescriptor::post("https://example.com/form", "a=1").unwrap();
        let head = redirect_head(302, "https://example.com/form", Some("/done"));

        let next = DefaultRedirectHandler
            .redirect_request(&request, &head)
            .unwrap();
        assert_eq!(*next.method(), Method::GET);
        assert!(next.body().is_none());
    }

    #[test]
    fn test_post_preserved_on_307() {
        let request = RequestDescriptor::post("https://example.com/form", "a=1").unwrap();
        let head = redirect_head(307, "https://example.com/form", Some("/other"));

        let next = DefaultRedirectHandler
            .redirect_request(&request, &head)
            .unwrap();
        assert_eq!(*next.method(), Method::POST);
        assert_eq!(&next.body().unwrap()[..], b"a=1");
    }

    #[test]
    fn test_missing_location_yields_none() {
        let request = RequestDescriptor::get("https://example.com/a").unwrap();
        let head = redirect_head(302, "https://example.com/a", None);
        assert!(DefaultRedirectHandler.redirect_request(&request, &head).is_none());
    }

    #[test]
    fn test_no_redirect_handler() {
        let request = RequestDescriptor::get("https://example.com/a").unwrap();
        let head = redirect_head(302, "https://example.com/a", Some("/b"));
        assert!(NoRedirect.redirect_request(&request, &head).is_none());
    }
}
