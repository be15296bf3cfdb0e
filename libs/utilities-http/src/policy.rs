//! Retry decisions and backoff.
//!
//! A [`RetryPolicy`] is an ordered chain of predicates. Each predicate looks
//! at the outcome of one attempt and either makes a [`Decision`] or passes.
//! The first decisive predicate wins; if none decides, the attempt succeeds.

use crate::error::HttpError;
use http::{HeaderMap, StatusCode};
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Try again if attempts remain; the reason is reported on exhaustion.
    Retry(String),
    /// Hand the response to the caller.
    StopSuccess,
    /// Fail now without retrying.
    StopFailure(String),
}

/// Result of a single attempt as seen by the policy.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    Status(StatusCode),
    Error(&'a HttpError),
}

/// Everything a predicate may inspect.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub cancelled: bool,
    pub outcome: AttemptOutcome<'a>,
    pub success_status_codes: &'a BTreeSet<u16>,
}

/// One link of the chain; `None` means "no opinion".
pub type Predicate = fn(&PolicyInput<'_>) -> Option<Decision>;

pub(crate) fn unexpected_status(status: StatusCode) -> String {
    format!("unexpected HTTP status {status}")
}

/// Cancellation of the calling context stops everything.
pub fn cancellation(input: &PolicyInput<'_>) -> Option<Decision> {
    input
        .cancelled
        .then(|| Decision::StopFailure("request cancelled".to_owned()))
}

/// Transport failures (timeouts included) are assumed recoverable.
/// Any other error is final.
pub fn transport_error(input: &PolicyInput<'_>) -> Option<Decision> {
    match input.outcome {
        AttemptOutcome::Error(HttpError::Cancelled) => {
            Some(Decision::StopFailure("request cancelled".to_owned()))
        }
        AttemptOutcome::Error(err @ (HttpError::Transport(_) | HttpError::Timeout(_))) => {
            Some(Decision::Retry(err.to_string()))
        }
        AttemptOutcome::Error(err) => Some(Decision::StopFailure(err.to_string())),
        AttemptOutcome::Status(_) => None,
    }
}

/// A status listed in `success_status_codes` is a success.
pub fn allow_list_hit(input: &PolicyInput<'_>) -> Option<Decision> {
    match input.outcome {
        AttemptOutcome::Status(status)
            if input.success_status_codes.contains(&status.as_u16()) =>
        {
            Some(Decision::StopSuccess)
        }
        _ => None,
    }
}

/// Other server errors and `429` are retried. `501` is final unless an
/// allow-list is set, in which case it is left to [`allow_list_miss`].
pub fn baseline_status(input: &PolicyInput<'_>) -> Option<Decision> {
    let AttemptOutcome::Status(status) = input.outcome else {
        return None;
    };
    if status == StatusCode::NOT_IMPLEMENTED {
        return input
            .success_status_codes
            .is_empty()
            .then(|| Decision::StopFailure(unexpected_status(status)));
    }
    (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()).then(|| Decision::Retry(unexpected_status(status)))
}

/// With an allow-list, anything outside it is retried.
pub fn allow_list_miss(input: &PolicyInput<'_>) -> Option<Decision> {
    match input.outcome {
        AttemptOutcome::Status(status) if !input.success_status_codes.is_empty() => {
            Some(Decision::Retry(unexpected_status(status)))
        }
        _ => None,
    }
}

/// Ordered predicate chain.
#[derive(Clone)]
pub struct RetryPolicy {
    chain: Vec<(&'static str, Predicate)>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.chain.iter().map(|(name, _)| name))
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
            .then("cancellation", cancellation)
            .then("transport_error", transport_error)
            .then("allow_list_hit", allow_list_hit)
            .then("baseline_status", baseline_status)
            .then("allow_list_miss", allow_list_miss)
    }
}

impl RetryPolicy {
    /// An empty chain: every attempt succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Append a named predicate.
    #[must_use]
    pub fn then(mut self, name: &'static str, predicate: Predicate) -> Self {
        self.chain.push((name, predicate));
        self
    }

    /// Names of the predicates in evaluation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.chain.iter().map(|(name, _)| *name)
    }

    /// Evaluate the chain. Falls back to [`Decision::StopSuccess`].
    #[must_use]
    pub fn decide(&self, input: &PolicyInput<'_>) -> Decision {
        self.chain
            .iter()
            .find_map(|(_, predicate)| predicate(input))
            .unwrap_or(Decision::StopSuccess)
    }
}

/// Exponential backoff with jitter inside `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Lower and upper bound of the window for retry `n` (0-based).
    #[must_use]
    pub fn window(&self, retry: u32) -> (Duration, Duration) {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let low = self.min.saturating_mul(factor).min(self.max);
        let high = self.min.saturating_mul(factor).saturating_mul(2).min(self.max);
        (low, high)
    }

    /// Delay before retry `n` (0-based).
    ///
    /// `Retry-After` on a `429` or `503` takes precedence and is clamped to
    /// `[min, max]`.
    #[must_use]
    pub fn delay(&self, retry: u32, response: Option<(StatusCode, &HeaderMap)>) -> Duration {
        if let Some((status, headers)) = response
            && matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
            )
            && let Some(after) = crate::response::parse_retry_after(headers)
        {
            return after.clamp(self.min, self.max.max(self.min));
        }

        let (low, high) = self.window(retry);
        if high <= low {
            return low;
        }
        let low_ms = u64::try_from(low.as_millis()).unwrap_or(u64::MAX);
        let high_ms = u64::try_from(high.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(low_ms..=high_ms))
    }
}
