//! Proxy resolution from the process environment.
//!
//! Settings are read from `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` (upper
//! case first, then lower case) on every fetch, so changes to the environment
//! are picked up without rebuilding the engine. Loopback hosts are never
//! proxied.
//!
//! Plain HTTP targets are sent to the proxy in absolute form; HTTPS targets
//! are tunnelled through a `CONNECT` request before the TLS handshake.

use crate::error::HttpError;
use http::header::HeaderValue;
use http::uri::Scheme;
use http::{HeaderMap, Request, Uri};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::proxy::matcher::{Intercept, Matcher};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tower::{BoxError, Layer, Service, ServiceExt};

/// Proxy settings resolved from environment variables.
#[derive(Debug)]
pub struct ProxySettings {
    matcher: Matcher,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self::none()
    }
}

impl ProxySettings {
    /// No proxy for any destination.
    #[must_use]
    pub fn none() -> Self {
        Self {
            matcher: Matcher::builder().build(),
        }
    }

    /// Read the current process environment.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidProxy` when a proxy variable is malformed.
    pub fn from_env() -> Result<Self, HttpError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidProxy` when a proxy variable is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HttpError> {
        let first = |upper: &str, lower: &str| {
            lookup(upper)
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(lower).filter(|v| !v.is_empty()))
        };

        let http = first("HTTP_PROXY", "http_proxy")
            .map(checked_proxy_url)
            .transpose()?
            .unwrap_or_default();
        let https = first("HTTPS_PROXY", "https_proxy")
            .map(checked_proxy_url)
            .transpose()?
            .unwrap_or_default();
        let no = first("NO_PROXY", "no_proxy").unwrap_or_default();

        Ok(Self {
            matcher: Matcher::builder().http(http).https(https).no(no).build(),
        })
    }

    /// The proxy to use for `uri`, if any.
    #[must_use]
    pub fn proxy_for(&self, uri: &Uri) -> Option<Intercept> {
        let host = uri.host()?.trim_start_matches('[').trim_end_matches(']');
        if host.eq_ignore_ascii_case("localhost")
            || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
        {
            return None;
        }
        self.matcher.intercept(uri)
    }
}

/// Reject proxy URLs the transport cannot speak to. A missing scheme means
/// `http://`.
fn checked_proxy_url(raw: String) -> Result<String, HttpError> {
    let invalid = |reason: String| HttpError::InvalidProxy {
        proxy: raw.clone(),
        reason,
    };

    let uri: Uri = raw
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    if uri.scheme().is_some_and(|scheme| *scheme != Scheme::HTTP) {
        return Err(invalid("only http:// proxies are supported".to_owned()));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(raw)
}

pin_project! {
    /// Connection returned by [`ProxyConnector`].
    ///
    /// Reports itself as proxied when requests on it must use absolute form.
    pub struct ProxyStream {
        #[pin]
        inner: TokioIo<TcpStream>,
        forwarded: bool,
    }
}

impl Read for ProxyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl Write for ProxyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }
}

impl Connection for ProxyStream {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.forwarded)
    }
}

/// TCP connector that routes through the configured proxy.
#[derive(Clone)]
pub struct ProxyConnector {
    http: HttpConnector,
    settings: Arc<ProxySettings>,
}

impl ProxyConnector {
    #[must_use]
    pub fn new(settings: Arc<ProxySettings>) -> Self {
        let mut http = HttpConnector::new();
        // The TLS layer above hands us https:// URIs too.
        http.enforce_http(false);
        Self { http, settings }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<ProxyStream, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let proxy = self.settings.proxy_for(&dst);
        let mut http = self.http.clone();

        Box::pin(async move {
            let Some(proxy) = proxy else {
                let inner = http.call(dst).await?;
                return Ok(ProxyStream {
                    inner,
                    forwarded: false,
                });
            };

            tracing::debug!(proxy = %proxy.uri(), target = %dst, "connecting through proxy");
            if dst.scheme() == Some(&Scheme::HTTPS) {
                let mut tunnel = Tunnel::new(proxy.uri().clone(), http);
                if let Some(auth) = proxy.basic_auth() {
                    tunnel = tunnel.with_auth(auth.clone());
                }
                let inner = tunnel.ready().await?.call(dst).await?;
                Ok(ProxyStream {
                    inner,
                    forwarded: false,
                })
            } else {
                let inner = http.call(proxy.uri().clone()).await?;
                Ok(ProxyStream {
                    inner,
                    forwarded: true,
                })
            }
        })
    }
}

/// Adds `Proxy-Authorization` to plain-HTTP requests routed through an
/// authenticated proxy.
#[derive(Clone)]
pub struct ProxyAuthLayer {
    settings: Arc<ProxySettings>,
}

impl ProxyAuthLayer {
    #[must_use]
    pub fn new(settings: Arc<ProxySettings>) -> Self {
        Self { settings }
    }
}

impl<S> Layer<S> for ProxyAuthLayer {
    type Service = ProxyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProxyAuthService {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

#[derive(Clone)]
pub struct ProxyAuthService<S> {
    inner: S,
    settings: Arc<ProxySettings>,
}

impl<S, B> Service<Request<B>> for ProxyAuthService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if req.uri().scheme() != Some(&Scheme::HTTPS)
            && let Some(auth) = self
                .settings
                .proxy_for(req.uri())
                .and_then(|p| p.basic_auth().cloned())
        {
            insert_if_absent(req.headers_mut(), auth);
        }
        self.inner.call(req)
    }
}

fn insert_if_absent(headers: &mut HeaderMap, auth: HeaderValue) {
    headers
        .entry(http::header::PROXY_AUTHORIZATION)
        .or_insert(auth);
}
