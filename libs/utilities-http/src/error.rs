use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors produced while building, sending and reading a fetch.
///
/// These never leave the crate as-is: the engine maps each variant to a
/// [`Diagnostic`](crate::Diagnostic) at its boundary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Method outside of GET/HEAD/POST
    #[error("unsupported HTTP method '{0}': allowed methods are GET, HEAD and POST")]
    InvalidMethod(String),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is
    /// a diagnostic message for humans only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// URL scheme other than http/https
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// Retry bounds or other request fields are inconsistent
    #[error("invalid request configuration: {0}")]
    InvalidConfig(String),

    /// TLS material could not be loaded or assembled
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Proxy configuration from the environment is unusable
    #[error("invalid proxy configuration '{proxy}': {reason}")]
    InvalidProxy { proxy: String, reason: String },

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, TLS handshake, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The redirect hop limit was exceeded
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    /// The calling context was cancelled
    #[error("request cancelled")]
    Cancelled,

    /// Status the retry policy refused to accept
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: http::StatusCode },

    /// The retry budget ran out; `source` is the last failure seen
    #[error("{method} {url} giving up after {attempts} attempt(s): {source}")]
    GaveUp {
        method: http::Method,
        url: String,
        attempts: usize,
        #[source]
        source: Box<HttpError>,
    },

    /// Response body could not be read after a successful status line
    #[error("failed to read response body: {0}")]
    ResponseRead(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HttpError {
    /// Whether the failure (or the last failure before giving up) was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            HttpError::Timeout(_) => true,
            HttpError::GaveUp { source, .. } => source.is_timeout(),
            HttpError::Transport(err) => is_timeout_source(err.as_ref()),
            _ => false,
        }
    }

    /// Whether the failure came from cancellation of the calling context.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            HttpError::Cancelled => true,
            HttpError::GaveUp { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the failure is a configuration problem that no retry can fix.
    #[must_use]
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            HttpError::RequestBuild(_)
                | HttpError::InvalidHeaderName(_)
                | HttpError::InvalidHeaderValue(_)
                | HttpError::InvalidMethod(_)
                | HttpError::InvalidUri { .. }
                | HttpError::InvalidScheme { .. }
                | HttpError::InvalidConfig(_)
                | HttpError::InvalidProxy { .. }
        )
    }
}

/// Walk an error chain looking for an elapsed timer or an I/O timeout.
fn is_timeout_source(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<tower::timeout::error::Elapsed>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }
        current = e.source();
    }
    false
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().expect("Transport error should have a source");
        let downcast = source.downcast_ref::<TestError>();
        assert_eq!(downcast.map(|e| e.0), Some("connection refused"));
    }

    #[test]
    fn test_gave_up_message_names_attempts_and_cause() {
        let err = HttpError::GaveUp {
            method: http::Method::GET,
            url: "http://example.com/".to_owned(),
            attempts: 3,
            source: Box::new(HttpError::UnexpectedStatus {
                status: http::StatusCode::SERVICE_UNAVAILABLE,
            }),
        };

        assert_eq!(
            err.to_string(),
            "GET http://example.com/ giving up after 3 attempt(s): \
             unexpected HTTP status 503 Service Unavailable"
        );
    }

    #[test]
    fn test_timeout_detected_through_gave_up() {
        let err = HttpError::GaveUp {
            method: http::Method::GET,
            url: "http://example.com/".to_owned(),
            attempts: 2,
            source: Box::new(HttpError::Timeout(Duration::from_millis(10))),
        };
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_io_timeout_in_transport_chain_is_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out");
        let err = HttpError::Transport(Box::new(io));
        assert!(err.is_timeout());

        let err = HttpError::Transport(Box::new(TestError("reset")));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_build_errors_classified() {
        assert!(HttpError::InvalidMethod("PUT".to_owned()).is_build_error());
        assert!(HttpError::InvalidConfig("x".to_owned()).is_build_error());
        assert!(!HttpError::Cancelled.is_build_error());
        assert!(!HttpError::Timeout(Duration::from_secs(1)).is_build_error());
    }
}
