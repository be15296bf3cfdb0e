use crate::config::TransportDefaults;
use crate::error::HttpError;
use crate::layers::{DefaultHeaderLayer, FetchRedirectPolicy, RetryLayer};
use crate::proxy::{ProxyAuthLayer, ProxyConnector, ProxySettings};
use crate::response::ResponseBody;
use crate::tls::{self, TlsOptions};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

/// Type-erased transport for one fetch.
pub type FetchService = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Assembles the transport used by a single fetch.
///
/// Nothing here is shared between calls: every build gets its own TLS
/// configuration, connection pool and proxy snapshot, starting from a
/// borrowed [`TransportDefaults`].
pub struct TransportBuilder<'a> {
    defaults: &'a TransportDefaults,
    tls: TlsOptions<'a>,
    proxy: Arc<ProxySettings>,
    timeout: Option<Duration>,
    retry: Option<RetryLayer>,
}

impl<'a> TransportBuilder<'a> {
    #[must_use]
    pub fn new(defaults: &'a TransportDefaults) -> Self {
        Self {
            defaults,
            tls: TlsOptions::default(),
            proxy: Arc::new(ProxySettings::none()),
            timeout: None,
            retry: None,
        }
    }

    /// Per-request TLS material and verification mode.
    #[must_use]
    pub fn tls(mut self, tls: TlsOptions<'a>) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Arc::new(proxy);
        self
    }

    /// Timeout applied to each attempt separately, up to the response
    /// headers. `None` leaves attempts unbounded.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wrap the transport in a retry loop. Without one, a single attempt is
    /// made and every status is returned as-is.
    #[must_use]
    pub fn retry(mut self, retry: RetryLayer) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the service stack.
    ///
    /// Request flow (outer to inner):
    ///   Retry → Timeout → `User-Agent` → Decompression → `FollowRedirect` →
    ///   Proxy-Authorization → hyper client (proxy aware, TLS)
    ///
    /// # Errors
    /// Returns `HttpError::Tls` for unusable TLS material and
    /// `HttpError::InvalidHeaderValue` for a bad default user agent.
    pub fn build(self) -> Result<FetchService, HttpError> {
        let defaults = self.defaults;
        let timeout = self.timeout;

        let client_config = tls::build_client_config(defaults.tls_roots, &self.tls)?;
        let https = build_https_connector(client_config, Arc::clone(&self.proxy));

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect.
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(defaults.pool_max_idle_per_host)
            .pool_idle_timeout(defaults.pool_idle_timeout);
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            // Disabled means unbounded, so both cases share one error type.
            .layer(TimeoutLayer::new(timeout.unwrap_or(Duration::MAX)))
            .layer(DefaultHeaderLayer::user_agent(&defaults.user_agent)?)
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(FetchRedirectPolicy::new(
                defaults.redirect.clone(),
            )))
            .map_err(|e: hyper_util::client::legacy::Error| -> tower::BoxError { Box::new(e) })
            .layer(ProxyAuthLayer::new(self.proxy))
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout.unwrap_or_default()))
            .boxed_clone();

        Ok(match self.retry {
            Some(retry) => retry.layer(service).boxed_clone(),
            None => service,
        })
    }
}

/// Map tower errors to `HttpError`, keeping typed errors that were boxed on
/// the way up.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the decompression body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// TLS over the proxy-aware TCP connector.
///
/// Both `http` and `https` targets are accepted; ALPN advertises h2 and
/// http/1.1.
fn build_https_connector(
    client_config: ClientConfig,
    proxy: Arc<ProxySettings>,
) -> HttpsConnector<ProxyConnector> {
    hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(client_config)
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(ProxyConnector::new(proxy))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_build_with_defaults() {
        let defaults = TransportDefaults::default();
        assert!(TransportBuilder::new(&defaults).build().is_ok());
    }

    #[tokio::test]
    async fn test_build_with_retry_and_timeout() {
        let defaults = TransportDefaults::default();
        let built = TransportBuilder::new(&defaults)
            .timeout(Some(Duration::from_secs(1)))
            .retry(RetryLayer::new(CancellationToken::new()).attempts(2))
            .build();
        assert!(built.is_ok());
    }

    #[tokio::test]
    async fn test_build_rejects_garbage_ca() {
        let defaults = TransportDefaults::default();
        let result = TransportBuilder::new(&defaults)
            .tls(TlsOptions {
                ca_cert_pem: Some("not a certificate"),
                ..TlsOptions::default()
            })
            .build();
        assert!(matches!(result, Err(HttpError::Tls(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_user_agent() {
        let defaults = TransportDefaults {
            user_agent: "bad\nagent".to_owned(),
            ..TransportDefaults::default()
        };
        let result = TransportBuilder::new(&defaults).build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[test]
    fn test_map_tower_error_elapsed_uses_configured_timeout() {
        let boxed: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let result = map_tower_error(boxed, Duration::from_millis(250));
        assert!(matches!(result, HttpError::Timeout(d) if d == Duration::from_millis(250)));
    }

    #[test]
    fn test_map_tower_error_preserves_http_error() {
        let boxed: tower::BoxError = Box::new(HttpError::Timeout(Duration::from_secs(5)));
        let result = map_tower_error(boxed, Duration::from_secs(30));
        assert!(matches!(result, HttpError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[test]
    fn test_map_tower_error_wraps_unknown_as_transport() {
        let other: tower::BoxError = Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let result = map_tower_error(other, Duration::from_secs(30));
        assert!(matches!(result, HttpError::Transport(_)));
    }
}
