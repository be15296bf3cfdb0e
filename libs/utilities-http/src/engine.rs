//! The fetch engine: one configurable HTTP request with retries, mapped to
//! a [`FetchOutcome`] or to [`Diagnostics`].

use crate::builder::TransportBuilder;
use crate::config::TransportDefaults;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::HttpError;
use crate::layers::RetryLayer;
use crate::logger::{SharedLogger, TracingLogger};
use crate::policy::Backoff;
use crate::proxy::ProxySettings;
use crate::request::{FetchRequest, validate_url};
use crate::response::{FetchOutcome, FetchResult, ResponseBody, into_fetch_result};
use crate::tls::TlsOptions;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Executes fetches against shared [`TransportDefaults`].
///
/// The engine is cheap to clone and safe to use from many tasks at once;
/// each call builds its own transport.
#[derive(Clone)]
pub struct FetchEngine {
    defaults: Arc<TransportDefaults>,
    logger: SharedLogger,
}

impl Default for FetchEngine {
    fn default() -> Self {
        Self::new(TransportDefaults::default())
    }
}

impl FetchEngine {
    #[must_use]
    pub fn new(defaults: TransportDefaults) -> Self {
        Self {
            defaults: Arc::new(defaults),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Route retry lifecycle messages to `logger` instead of `tracing`.
    #[must_use]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn defaults(&self) -> &TransportDefaults {
        &self.defaults
    }

    /// Perform `request`, retrying as its settings and the status allow-list
    /// dictate.
    ///
    /// # Errors
    /// Returns error diagnostics for unusable TLS material, invalid request
    /// fields, transport failures, refused statuses, unreadable bodies and
    /// cancellation. No result is produced in those cases.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, Diagnostics> {
        let timeout = request.timeout();
        match self.try_fetch(request, cancel).await {
            Ok(result) => {
                tracing::debug!(
                    url = %request.url,
                    status = result.status_code,
                    bytes = result.response_body.len(),
                    "fetch completed"
                );
                Ok(FetchOutcome::new(result))
            }
            Err(err) => {
                tracing::debug!(url = %request.url, error = %err, "fetch failed");
                Err(Diagnostic::from_fetch_error(&err, timeout).into())
            }
        }
    }

    async fn try_fetch(
        &self,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, HttpError> {
        let defaults = TransportDefaults::clone(&self.defaults);
        let retry = request.retry_settings();
        retry.validate()?;

        let service = TransportBuilder::new(&defaults)
            .tls(TlsOptions {
                insecure: request.insecure,
                ca_cert_pem: request.ca_cert_pem.as_deref(),
                client_identity: request.client_identity()?,
            })
            .proxy(ProxySettings::from_env()?)
            .timeout(request.timeout())
            .retry(
                RetryLayer::new(cancel.clone())
                    .attempts(retry.attempts)
                    .backoff(Backoff::new(retry.min_delay(), retry.max_delay()))
                    .success_status_codes(request.success_status_codes.clone())
                    .logger(Arc::clone(&self.logger))
                    .drain_limit(defaults.retry_response_drain_limit),
            )
            .build()?;

        let http_request = request.to_http_request()?;
        let response = service.oneshot(http_request).await?;
        read_response(response, cancel, request.timeout()).await
    }

    /// Single unconditional `GET` of `url`: no retries, every status accepted.
    ///
    /// # Errors
    /// Returns error diagnostics when the URL is invalid, the transport fails,
    /// the body cannot be read or `cancel` fires.
    pub async fn download(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, Diagnostics> {
        self.try_download(url, cancel)
            .await
            .map_err(|err| Diagnostic::from_fetch_error(&err, None).into())
    }

    async fn try_download(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, HttpError> {
        let uri = validate_url(url)?;
        let defaults = TransportDefaults::clone(&self.defaults);
        let service = TransportBuilder::new(&defaults)
            .proxy(ProxySettings::from_env()?)
            .build()?;

        let request = Request::get(uri).body(Full::new(Bytes::new()))?;
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled),
            res = service.oneshot(request) => res?,
        };
        read_response(response, cancel, None).await
    }
}

/// Read the whole body, giving up as soon as `cancel` fires or `timeout`
/// elapses.
async fn read_response(
    response: Response<ResponseBody>,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<FetchResult, HttpError> {
    let read = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, into_fetch_result(response))
                .await
                .unwrap_or_else(|_| Err(HttpError::Timeout(limit))),
            None => into_fetch_result(response).await,
        }
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(HttpError::Cancelled),
        res = read => res,
    }
}

impl Diagnostic {
    /// Classify an engine failure.
    ///
    /// `timeout` is the per-attempt timeout the request was configured with;
    /// it is quoted in timeout diagnostics.
    #[must_use]
    pub fn from_fetch_error(err: &HttpError, timeout: Option<Duration>) -> Self {
        if err.is_cancelled() {
            return Diagnostic::error(
                DiagnosticKind::RequestCancelledError,
                "Request cancelled",
                format!("The request was cancelled before it completed: {err}"),
            );
        }

        match err {
            HttpError::Tls(_) => Diagnostic::error(
                DiagnosticKind::TlsConfigError,
                "Error configuring TLS client",
                format!("Error configuring TLS client: {err}"),
            ),
            e if e.is_build_error() => Diagnostic::error(
                DiagnosticKind::RequestBuildError,
                "Error creating request",
                format!("Error creating request: {err}"),
            ),
            e if e.is_timeout() => {
                let configured = timeout.map_or_else(
                    || "none".to_owned(),
                    |t| humantime::format_duration(t).to_string(),
                );
                Diagnostic::error(
                    DiagnosticKind::RequestTimeoutError,
                    "Error making request",
                    format!("request exceeded the specified timeout: {configured}, err: {err}"),
                )
            }
            HttpError::ResponseRead(_) => Diagnostic::error(
                DiagnosticKind::ResponseReadError,
                "Error reading response body",
                format!("Error reading response body: {err}"),
            ),
            _ => Diagnostic::error(
                DiagnosticKind::RequestError,
                "Error making request",
                format!("Error making request: {err}"),
            ),
        }
    }
}
