//! Redirect policy for fetches.
//!
//! Redirects are followed up to [`RedirectConfig::max_redirects`] hops. When
//! a hop leaves the original origin, credentials (`Authorization`, `Cookie`,
//! `Proxy-Authorization`) are removed from the follow-up request. Same-origin
//! enforcement and HTTPS downgrade blocking are available but off by default.
//!
//! Running past the limit fails the attempt with
//! [`HttpError::TooManyRedirects`]. With a limit of `0` redirects are not
//! followed and the 3xx response is returned as-is.

use crate::config::RedirectConfig;
use crate::error::HttpError;
use http::{Request, Uri, header};
use tower::BoxError;
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// [`Policy`] implementation driven by a [`RedirectConfig`].
///
/// A fresh clone is used for every request, so the hop counter and the
/// cross-origin flag never leak between fetches.
#[derive(Debug, Clone)]
pub struct FetchRedirectPolicy {
    config: RedirectConfig,
    hops: usize,
    crossed_origin: bool,
}

impl FetchRedirectPolicy {
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            hops: 0,
            crossed_origin: false,
        }
    }

    /// Scheme, host and effective port all match.
    fn is_same_origin(original: &Uri, target: &Uri) -> bool {
        let origin = |uri: &Uri| {
            let scheme = uri.scheme_str().unwrap_or("https").to_owned();
            let port = uri.port_u16().unwrap_or(match scheme.as_str() {
                "http" => 80,
                _ => 443,
            });
            (scheme, uri.host().map(str::to_ascii_lowercase), port)
        };
        origin(original) == origin(target)
    }

    fn is_https_downgrade(original: &Uri, target: &Uri) -> bool {
        original.scheme_str() == Some("https") && target.scheme_str() == Some("http")
    }

    fn is_allowed_host(&self, target: &Uri) -> bool {
        target
            .host()
            .is_some_and(|host| self.config.allowed_redirect_hosts.contains(host))
    }
}

impl<B: Clone> Policy<B, BoxError> for FetchRedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, BoxError> {
        let max = self.config.max_redirects;
        if max == 0 {
            return Ok(Action::Stop);
        }
        self.hops += 1;
        if self.hops > max {
            tracing::debug!(hops = self.hops, max, "redirect limit reached");
            return Err(Box::new(HttpError::TooManyRedirects(max)));
        }

        let original = attempt.previous();
        let target = attempt.location();

        if !self.config.allow_https_downgrade && Self::is_https_downgrade(original, target) {
            tracing::warn!(%original, %target, "blocking HTTPS to HTTP downgrade redirect");
            return Ok(Action::Stop);
        }

        let same_origin = Self::is_same_origin(original, target);
        if self.config.same_origin_only && !same_origin && !self.is_allowed_host(target) {
            tracing::warn!(%original, %target, "blocking cross-origin redirect");
            return Ok(Action::Stop);
        }

        if !same_origin {
            self.crossed_origin = true;
        }
        tracing::debug!(%original, %target, status = %attempt.status(), "following redirect");

        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if self.crossed_origin && self.config.strip_sensitive_headers {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "stripped sensitive header after cross-origin redirect");
                }
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 resend the original body.
        Some(body.clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_same_origin_rules() {
        let same = FetchRedirectPolicy::is_same_origin;
        assert!(same(&uri("https://example.com/a"), &uri("https://example.com/b")));
        assert!(same(&uri("https://example.com/a"), &uri("https://EXAMPLE.com:443/b")));
        assert!(same(&uri("http://example.com/a"), &uri("http://example.com:80/b")));
        assert!(!same(&uri("https://example.com/a"), &uri("https://other.com/b")));
        assert!(!same(&uri("https://example.com/a"), &uri("http://example.com/b")));
        assert!(!same(&uri("https://example.com/a"), &uri("https://example.com:8443/b")));
    }

    #[test]
    fn test_https_downgrade_detection() {
        let downgrade = FetchRedirectPolicy::is_https_downgrade;
        assert!(downgrade(&uri("https://example.com"), &uri("http://example.com")));
        assert!(!downgrade(&uri("http://example.com"), &uri("https://example.com")));
        assert!(!downgrade(&uri("https://example.com"), &uri("https://other.com")));
    }

    #[test]
    fn test_allowed_host() {
        let config = RedirectConfig {
            allowed_redirect_hosts: HashSet::from(["trusted.com".to_owned()]),
            ..RedirectConfig::strict()
        };
        let policy = FetchRedirectPolicy::new(config);
        assert!(policy.is_allowed_host(&uri("https://trusted.com/path")));
        assert!(!policy.is_allowed_host(&uri("https://untrusted.com/path")));
    }

    #[test]
    fn test_on_request_strips_only_after_cross_origin() {
        let mut policy = FetchRedirectPolicy::new(RedirectConfig::default());
        let mut req = Request::builder()
            .uri("https://example.com")
            .header(header::AUTHORIZATION, "Bearer t")
            .header(header::COOKIE, "c=1")
            .header("x-keep", "1")
            .body(())
            .unwrap();

        Policy::<(), BoxError>::on_request(&mut policy, &mut req);
        assert!(req.headers().contains_key(header::AUTHORIZATION));

        policy.crossed_origin = true;
        Policy::<(), BoxError>::on_request(&mut policy, &mut req);
        assert!(!req.headers().contains_key(header::AUTHORIZATION));
        assert!(!req.headers().contains_key(header::COOKIE));
        assert!(req.headers().contains_key("x-keep"));
    }

    #[test]
    fn test_stripping_can_be_disabled() {
        let mut policy = FetchRedirectPolicy::new(RedirectConfig {
            strip_sensitive_headers: false,
            ..RedirectConfig::default()
        });
        policy.crossed_origin = true;
        let mut req = Request::builder()
            .uri("https://example.com")
            .header(header::AUTHORIZATION, "Bearer t")
            .body(())
            .unwrap();
        Policy::<(), BoxError>::on_request(&mut policy, &mut req);
        assert!(req.headers().contains_key(header::AUTHORIZATION));
    }

    #[test]
    fn test_new_policy_starts_clean() {
        let policy = FetchRedirectPolicy::new(RedirectConfig::default());
        assert_eq!(policy.hops, 0);
        assert!(!policy.crossed_origin);
    }
}
