use crate::config::{DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT};
use crate::error::HttpError;
use crate::logger::{SharedLogger, TracingLogger};
use crate::policy::{AttemptOutcome, Backoff, Decision, PolicyInput, RetryPolicy};
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service, ServiceExt};

/// Tower layer running the fetch retry loop.
///
/// Every attempt is judged by a [`RetryPolicy`]; `Retry` decisions sleep for
/// a [`Backoff`] delay and try again until `attempts` retries are used up.
/// The caller's [`CancellationToken`] aborts both in-flight attempts and
/// pending sleeps.
#[derive(Clone)]
pub struct RetryLayer {
    policy: Arc<RetryPolicy>,
    attempts: u32,
    backoff: Backoff,
    success_status_codes: Arc<BTreeSet<u16>>,
    cancel: CancellationToken,
    logger: SharedLogger,
    drain_limit: usize,
}

impl RetryLayer {
    /// Default policy chain, no retries, tracing logger.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            policy: Arc::new(RetryPolicy::default()),
            attempts: 0,
            backoff: Backoff::new(DEFAULT_MIN_DELAY, DEFAULT_MAX_DELAY),
            success_status_codes: Arc::new(BTreeSet::new()),
            cancel,
            logger: Arc::new(TracingLogger),
            drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
        }
    }

    #[must_use]
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Number of retries after the first attempt.
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn success_status_codes(mut self, codes: BTreeSet<u16>) -> Self {
        self.success_status_codes = Arc::new(codes);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Upper bound on bytes read from a response that is about to be retried.
    #[must_use]
    pub fn drain_limit(mut self, limit: usize) -> Self {
        self.drain_limit = limit;
        self
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.clone(),
        }
    }
}

/// Service produced by [`RetryLayer`].
///
/// Returns `Ok(Response)` only when the policy accepted the status. Every
/// other exit is an `Err`: the attempt's own error, `UnexpectedStatus` for a
/// refused status, `Cancelled`, or `GaveUp` once retries are exhausted.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: RetryLayer,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Consume the instance that was poll_ready'd.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();

        let (parts, body) = req.into_parts();
        let extensions = parts.extensions.clone();
        let parts = Arc::new(parts);

        Box::pin(async move {
            let RetryLayer {
                policy,
                attempts,
                backoff,
                success_status_codes,
                cancel,
                logger,
                drain_limit,
            } = config;
            let method = parts.method.clone();
            let url = parts.uri.to_string();

            let mut retry = 0u32;
            loop {
                let mut req = Request::from_parts((*parts).clone(), body.clone());
                *req.extensions_mut() = extensions.clone();

                let attempt = retry + 1;
                logger.debug(
                    "sending request",
                    &[("method", &method), ("url", &url), ("attempt", &attempt)],
                );

                let mut svc = inner.clone();
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(HttpError::Cancelled),
                    res = async {
                        svc.ready().await?;
                        svc.call(req).await
                    } => res,
                };

                let decision = {
                    let outcome = match &result {
                        Ok(resp) => AttemptOutcome::Status(resp.status()),
                        Err(err) => AttemptOutcome::Error(err),
                    };
                    policy.decide(&PolicyInput {
                        cancelled: cancel.is_cancelled(),
                        outcome,
                        success_status_codes: &success_status_codes,
                    })
                };

                match decision {
                    Decision::StopSuccess => return result,
                    Decision::StopFailure(reason) => {
                        logger.error(
                            "request failed",
                            &[("method", &method), ("url", &url), ("reason", &reason)],
                        );
                        return Err(match result {
                            _ if cancel.is_cancelled() => HttpError::Cancelled,
                            Ok(resp) => HttpError::UnexpectedStatus {
                                status: resp.status(),
                            },
                            Err(err) => err,
                        });
                    }
                    Decision::Retry(reason) => {
                        if retry >= attempts {
                            logger.error(
                                "giving up",
                                &[
                                    ("method", &method),
                                    ("url", &url),
                                    ("attempts", &attempt),
                                    ("reason", &reason),
                                ],
                            );
                            let source = match result {
                                Ok(resp) => HttpError::UnexpectedStatus {
                                    status: resp.status(),
                                },
                                Err(err) => err,
                            };
                            return Err(HttpError::GaveUp {
                                method,
                                url,
                                attempts: usize::try_from(attempt).unwrap_or(usize::MAX),
                                source: Box::new(source),
                            });
                        }

                        let delay = match result {
                            Ok(resp) => {
                                let delay =
                                    backoff.delay(retry, Some((resp.status(), resp.headers())));
                                drain_before_retry(resp, drain_limit, &logger).await;
                                delay
                            }
                            Err(_) => backoff.delay(retry, None),
                        };

                        let delay_ms = delay.as_millis();
                        logger.warn(
                            "retrying request",
                            &[
                                ("method", &method),
                                ("url", &url),
                                ("attempt", &attempt),
                                ("max_attempts", &(attempts + 1)),
                                ("delay_ms", &delay_ms),
                                ("reason", &reason),
                            ],
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => {
                                logger.info(
                                    "backoff interrupted by cancellation",
                                    &[("method", &method), ("url", &url)],
                                );
                                return Err(HttpError::Cancelled);
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                        retry += 1;
                    }
                }
            }
        })
    }
}

/// Read a refused response so its connection can go back to the pool.
///
/// Bodies announcing more than `limit` bytes are dropped unread, which
/// closes the connection instead.
async fn drain_before_retry(response: Response<ResponseBody>, limit: usize, logger: &SharedLogger) {
    let announced = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    if let Some(len) = announced
        && len > limit as u64
    {
        logger.debug(
            "skipping drain, body exceeds limit",
            &[("content_length", &len), ("limit", &limit)],
        );
        return;
    }

    if let Err(err) = drain_response_body(response, limit).await {
        logger.debug(
            "failed to drain response body before retry",
            &[("error", &err)],
        );
    }
}

async fn drain_response_body(response: Response<ResponseBody>, limit: usize) -> Result<(), HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::ResponseRead)?;
        if let Some(chunk) = frame.data_ref() {
            drained += chunk.len();
            if drained >= limit {
                break;
            }
        }
    }
    Ok(())
}
