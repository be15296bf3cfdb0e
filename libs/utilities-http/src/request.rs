use crate::config::{DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};
use crate::error::{HttpError, InvalidUriKind};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue};
use http::{Method, Request};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// HTTP methods a fetch may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    Head,
    Post,
}

impl FetchMethod {
    /// Parse a method name. An empty string means `GET`.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidMethod` for anything but `GET`, `HEAD` or `POST`.
    pub fn parse(method: &str) -> Result<Self, HttpError> {
        match method {
            "" | "GET" => Ok(FetchMethod::Get),
            "HEAD" => Ok(FetchMethod::Head),
            "POST" => Ok(FetchMethod::Post),
            other => Err(HttpError::InvalidMethod(other.to_owned())),
        }
    }

    #[must_use]
    pub fn as_http(self) -> Method {
        match self {
            FetchMethod::Get => Method::GET,
            FetchMethod::Head => Method::HEAD,
            FetchMethod::Post => Method::POST,
        }
    }
}

/// Retry bounds of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Number of retries after the first try; `2` means at most 3 tries.
    #[serde(default)]
    pub attempts: u32,

    /// Lower backoff bound in milliseconds (default 1000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_ms: Option<u64>,

    /// Upper backoff bound in milliseconds (default 30000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl RetrySettings {
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay_ms
            .map_or(DEFAULT_MIN_DELAY, Duration::from_millis)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay_ms
            .map_or(DEFAULT_MAX_DELAY, Duration::from_millis)
    }

    /// Check that the delay window is well formed.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidConfig` when `max_delay_ms < min_delay_ms`.
    pub fn validate(&self) -> Result<(), HttpError> {
        if let (Some(min), Some(max)) = (self.min_delay_ms, self.max_delay_ms)
            && max < min
        {
            return Err(HttpError::InvalidConfig(format!(
                "retry.max_delay_ms ({max}) must be at least retry.min_delay_ms ({min})"
            )));
        }
        Ok(())
    }
}

/// Declarative description of one HTTP fetch.
///
/// A request is never mutated by the engine; every fetch works on its own
/// copy of the transport settings and produces a fresh result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchRequest {
    /// Absolute `http` or `https` URL
    pub url: String,

    /// `GET`, `HEAD` or `POST`; empty means `GET`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,

    /// Header name to value; a `host` entry overrides the `Host` header
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, String>,

    /// Payload sent verbatim with its `Content-Length`; `None` sends no body
    /// and no length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,

    /// Per-attempt timeout in milliseconds; absent or `<= 0` disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<i64>,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure: bool,

    /// PEM bundle replacing the default trust roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_pem: Option<String>,

    /// PEM client certificate chain, paired with `client_key_pem`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_pem: Option<String>,

    /// PEM private key, paired with `client_cert_pem`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_pem: Option<String>,

    /// Retry bounds; absent means a single try
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,

    /// Statuses accepted as success; empty defers to the default policy
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub success_status_codes: BTreeSet<u16>,
}

impl FetchRequest {
    /// Shorthand for a `GET` of `url` with every other field at its default.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Per-attempt timeout, `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Retry settings, with "absent" meaning zero retries.
    #[must_use]
    pub fn retry_settings(&self) -> RetrySettings {
        self.retry.clone().unwrap_or_default()
    }

    /// Value of the `host` header (any case), if the caller set one.
    #[must_use]
    pub fn host_override(&self) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("host"))
            .map(|(_, value)| value.as_str())
    }

    /// Client identity as `(cert, key)` when both halves are present.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidConfig` when only one half is set.
    pub fn client_identity(&self) -> Result<Option<(&str, &str)>, HttpError> {
        match (&self.client_cert_pem, &self.client_key_pem) {
            (Some(cert), Some(key)) => Ok(Some((cert.as_str(), key.as_str()))),
            (None, None) => Ok(None),
            _ => Err(HttpError::InvalidConfig(
                "client_cert_pem and client_key_pem must be set together".to_owned(),
            )),
        }
    }

    /// Validate every field that can be checked without network access.
    ///
    /// Returns the parsed method and URI.
    ///
    /// # Errors
    /// Returns a build error for a bad method, URL, header or retry window.
    pub fn validate(&self) -> Result<(FetchMethod, http::Uri), HttpError> {
        let method = FetchMethod::parse(&self.method)?;
        let uri = validate_url(&self.url)?;
        for (name, value) in &self.request_headers {
            HeaderName::try_from(name.as_str())?;
            HeaderValue::try_from(value.as_str())?;
        }
        self.retry_settings().validate()?;
        self.client_identity()?;
        Ok((method, uri))
    }

    /// Build the `http::Request` sent on every attempt.
    ///
    /// # Errors
    /// Same conditions as [`FetchRequest::validate`].
    pub fn to_http_request(&self) -> Result<Request<Full<Bytes>>, HttpError> {
        let (method, uri) = self.validate()?;

        let mut builder = Request::builder().method(method.as_http()).uri(uri);

        for (name, value) in &self.request_headers {
            let name = HeaderName::try_from(name.as_str())?;
            if name != HOST {
                builder = builder.header(name, HeaderValue::try_from(value.as_str())?);
            }
        }

        let body = match &self.request_body {
            Some(payload) => {
                if let Some(headers) = builder.headers_mut() {
                    headers
                        .entry(CONTENT_LENGTH)
                        .or_insert_with(|| HeaderValue::from(payload.len()));
                }
                Full::new(Bytes::from(payload.clone()))
            }
            None => Full::default(),
        };

        let mut request = builder.body(body)?;
        // `Host` replaces rather than appends, so the override is the only value.
        if let Some(host) = self.host_override() {
            request
                .headers_mut()
                .insert(HOST, HeaderValue::try_from(host)?);
        }
        Ok(request)
    }
}

/// Parse and check an absolute `http`/`https` URL.
///
/// # Errors
/// Returns `HttpError::InvalidUri` or `HttpError::InvalidScheme`.
pub fn validate_url(url: &str) -> Result<http::Uri, HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    let scheme = uri.scheme_str().map(str::to_owned);
    match scheme.as_deref() {
        Some("http" | "https") => {}
        Some(other) => {
            return Err(HttpError::InvalidScheme {
                scheme: other.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            });
        }
        None => {
            return Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(uri)
}
