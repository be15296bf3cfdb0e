use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::HttpError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Type alias for the boxed response body that supports decompression.
///
/// The body is type-erased so the decompression layer stays transparent.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 9110:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date: "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` when the header is missing, unparsable, negative or
/// already in the past.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    let parsed = httpdate::parse_http_date(trimmed).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

/// Canonical MIME form of a header name: `content-type` → `Content-Type`.
///
/// The first letter and every letter after a hyphen are upper-cased, the
/// rest lower-cased.
#[must_use]
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// Flatten a header map to one string per canonical name.
///
/// Repeated headers are joined with `", "` in arrival order (RFC 9110 §5.2).
/// Values that are not visible ASCII are converted lossily.
#[must_use]
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(canonical_header_name(name.as_str()), joined);
    }
    out
}

/// Read a response body to the end.
///
/// # Errors
/// Returns `HttpError::ResponseRead` if a body frame fails.
pub async fn read_body(body: ResponseBody) -> Result<Bytes, HttpError> {
    body.collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(HttpError::ResponseRead)
}

/// Observed outcome of a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub status_code: u16,
    pub response_headers: BTreeMap<String, String>,
    /// Body as text; invalid UTF-8 sequences are replaced
    pub response_body: String,
    /// Standard base64 of the raw body bytes
    pub response_body_base64: String,
    pub utf8_valid: bool,
}

impl FetchResult {
    /// Build a result from the final status, headers and raw body.
    #[must_use]
    pub fn new(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Self {
        let utf8_valid = std::str::from_utf8(body).is_ok();
        Self {
            status_code: status.as_u16(),
            response_headers: flatten_headers(headers),
            response_body: String::from_utf8_lossy(body).into_owned(),
            response_body_base64: STANDARD.encode(body),
            utf8_valid,
        }
    }
}

/// A [`FetchResult`] plus the warnings produced while obtaining it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub result: FetchResult,
    pub warnings: Diagnostics,
}

impl FetchOutcome {
    /// Wrap a result, adding the encoding warning when the body is not UTF-8.
    #[must_use]
    pub fn new(result: FetchResult) -> Self {
        let mut warnings = Diagnostics::new();
        if !result.utf8_valid {
            warnings.add_warning(
                DiagnosticKind::ResponseEncodingWarning,
                "Response body is not recognized as UTF-8",
                "The response body may not be represented faithfully as text if the contents are \
                 binary; use response_body_base64 for the exact bytes.",
            );
        }
        Self { result, warnings }
    }
}

/// Split a response and read its body in one go.
///
/// # Errors
/// Returns `HttpError::ResponseRead` if the body cannot be read.
pub async fn into_fetch_result(response: Response<ResponseBody>) -> Result<FetchResult, HttpError> {
    let (parts, body) = response.into_parts();
    let bytes = read_body(body).await?;
    Ok(FetchResult::new(parts.status, &parts.headers, &bytes))
}
