use crate::error::HttpError;
use http::header::{HeaderName, USER_AGENT};
use http::{HeaderValue, Request};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Sets a header on every request that does not already carry it.
///
/// Caller-supplied values always win, so a fetch that sets its own
/// `User-Agent` keeps it.
#[derive(Debug, Clone)]
pub struct DefaultHeaderLayer {
    name: HeaderName,
    value: HeaderValue,
}

impl DefaultHeaderLayer {
    #[must_use]
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }

    /// Default `User-Agent`.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if `user_agent` is not a valid header value.
    pub fn user_agent(user_agent: &str) -> Result<Self, HttpError> {
        Ok(Self::new(USER_AGENT, HeaderValue::from_str(user_agent)?))
    }
}

impl<S> Layer<S> for DefaultHeaderLayer {
    type Service = DefaultHeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeaderService {
            inner,
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DefaultHeaderService<S> {
    inner: S,
    name: HeaderName,
    value: HeaderValue,
}

impl<S, B> Service<Request<B>> for DefaultHeaderService<S>
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
        req.headers_mut()
            .entry(&self.name)
            .or_insert_with(|| self.value.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::Response;
    use std::convert::Infallible;
    use tower::ServiceExt;

    /// Echoes the request's `User-Agent` back as the response body.
    fn echo_user_agent()
    -> impl Service<Request<()>, Response = Response<String>, Error = Infallible, Future: Send> + Clone
    {
        tower::service_fn(|req: Request<()>| async move {
            let ua = req
                .headers()
                .get_all(USER_AGENT)
                .iter()
                .map(|v| v.to_str().unwrap_or_default().to_owned())
                .collect::<Vec<_>>()
                .join("|");
            Ok::<_, Infallible>(Response::new(ua))
        })
    }

    #[tokio::test]
    async fn test_user_agent_added_when_missing() {
        let svc = DefaultHeaderLayer::user_agent("utilities-test/1.0")
            .unwrap()
            .layer(echo_user_agent());
        let req = Request::builder().uri("http://example.com").body(()).unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.body(), "utilities-test/1.0");
    }

    #[tokio::test]
    async fn test_caller_value_kept() {
        let svc = DefaultHeaderLayer::user_agent("utilities-test/1.0")
            .unwrap()
            .layer(echo_user_agent());
        let req = Request::builder()
            .uri("http://example.com")
            .header(USER_AGENT, "custom/2.0")
            .body(())
            .unwrap();

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.body(), "custom/2.0");
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let result = DefaultHeaderLayer::user_agent("bad\x00agent");
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }
}
