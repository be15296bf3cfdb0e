use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default User-Agent string for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("utilities-http/", env!("CARGO_PKG_VERSION"));

/// Lower bound of the backoff window when a request sets no retry delays
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Upper bound of the backoff window when a request sets no retry delays
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default maximum bytes to drain from a response body before retrying.
pub const DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

/// Redirect policy configuration
///
/// Defaults mirror a general-purpose client: redirects are followed to any
/// host, at most 10 hops, and credentials never leak across origins.
///
/// - **Header stripping**: Removes `Authorization`, `Cookie` and
///   `Proxy-Authorization` on cross-origin redirects
/// - **Same-origin enforcement**: opt-in, with a host allow-list
/// - **Downgrade protection**: opt-in blocking of HTTPS → HTTP hops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedirectConfig {
    /// Maximum number of redirects to follow (default: 10)
    ///
    /// Exceeding it fails the fetch. Set to `0` to disable redirect
    /// following entirely and return the 3xx response.
    pub max_redirects: usize,

    /// Only allow same-origin redirects (default: false)
    ///
    /// When `true`, redirects to different hosts are blocked unless the target
    /// host is in `allowed_redirect_hosts`.
    pub same_origin_only: bool,

    /// Hosts that are allowed as redirect targets even when `same_origin_only` is true
    ///
    /// Entries are hostnames only, without scheme or port.
    pub allowed_redirect_hosts: HashSet<String>,

    /// Strip sensitive headers on cross-origin redirects (default: true)
    pub strip_sensitive_headers: bool,

    /// Allow HTTPS → HTTP downgrades (default: true)
    pub allow_https_downgrade: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            same_origin_only: false,
            allowed_redirect_hosts: HashSet::new(),
            strip_sensitive_headers: true,
            allow_https_downgrade: true,
        }
    }
}

impl RedirectConfig {
    /// Only same-host redirects, no downgrades.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            same_origin_only: true,
            allow_https_downgrade: false,
            ..Default::default()
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport settings shared by every fetch of a [`FetchEngine`](crate::FetchEngine).
///
/// The engine keeps one instance behind an `Arc` and clones it for each call,
/// so per-call TLS and proxy changes never leak between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportDefaults {
    /// Idle connection timeout for the per-call pool (default: 90s)
    ///
    /// `None` keeps idle connections until the pool is dropped.
    #[serde(with = "crate::humantime_serde::option")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Root store used when a request carries no CA bundle of its own
    pub tls_roots: TlsRootConfig,

    /// Value of the `User-Agent` header when the request sets none
    pub user_agent: String,

    /// Redirect following policy
    pub redirect: RedirectConfig,

    /// Maximum bytes drained from a response body before retrying on its status
    ///
    /// Bodies larger than this are dropped instead and the connection is
    /// not reused.
    pub retry_response_drain_limit: usize,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            tls_roots: TlsRootConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            redirect: RedirectConfig::default(),
            retry_response_drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_transport_defaults() {
        let defaults = TransportDefaults::default();
        assert_eq!(defaults.pool_idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(defaults.pool_max_idle_per_host, 32);
        assert_eq!(defaults.tls_roots, TlsRootConfig::WebPki);
        assert!(defaults.user_agent.starts_with("utilities-http/"));
        assert_eq!(
            defaults.retry_response_drain_limit,
            DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT
        );
    }

    #[test]
    fn test_strict_redirects_keep_hop_limit() {
        let strict = RedirectConfig::strict();
        let loose = RedirectConfig::default();
        assert_eq!(strict.max_redirects, loose.max_redirects);
        assert!(strict.same_origin_only && !loose.same_origin_only);
        assert!(!strict.allow_https_downgrade && loose.allow_https_downgrade);
        assert!(strict.strip_sensitive_headers);
    }

    #[test]
    fn test_transport_defaults_deserialize_partial() {
        let json = r#"{
            "pool_idle_timeout": "15s",
            "tls_roots": "native",
            "redirect": { "max_redirects": 3 }
        }"#;
        let defaults: TransportDefaults = serde_json::from_str(json).unwrap();
        assert_eq!(defaults.pool_idle_timeout, Some(Duration::from_secs(15)));
        assert_eq!(defaults.tls_roots, TlsRootConfig::Native);
        assert_eq!(defaults.redirect.max_redirects, 3);
        assert!(defaults.redirect.strip_sensitive_headers);
        assert_eq!(defaults.pool_max_idle_per_host, 32);
    }

    #[test]
    fn test_transport_defaults_reject_unknown_fields() {
        let json = r#"{ "pool_size": 4 }"#;
        assert!(serde_json::from_str::<TransportDefaults>(json).is_err());
    }
}
