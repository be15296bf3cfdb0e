#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Configurable HTTP fetches with retries, reported as data.
//!
//! [`FetchEngine::fetch`] performs one [`FetchRequest`] and returns either a
//! [`FetchOutcome`] (the [`FetchResult`] plus warnings) or [`Diagnostics`].
//! Nothing panics and no error type crosses the API boundary.
//!
//! Each call builds its own transport on top of hyper and rustls:
//! - per-request TLS (custom CA bundle, client identity, insecure mode)
//! - proxies resolved from `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` on every call
//! - a retry loop driven by an ordered [`RetryPolicy`] with jittered backoff
//! - redirects, transparent decompression and a default `User-Agent`
//!
//! # Example
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use utilities_http::{FetchEngine, FetchRequest, TransportDefaults};
//!
//! let engine = FetchEngine::new(TransportDefaults::default());
//! let outcome = engine
//!     .fetch(&FetchRequest::get("https://example.com/"), &CancellationToken::new())
//!     .await?;
//! println!("{}", outcome.result.status_code);
//! ```

mod builder;
mod config;
mod diagnostics;
mod engine;
mod error;
pub mod humantime_serde;
mod layers;
pub mod logger;
pub mod policy;
pub mod proxy;
mod request;
mod response;
pub mod tls;

pub use builder::{FetchService, TransportBuilder};
pub use config::{
    DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT, DEFAULT_USER_AGENT,
    RedirectConfig, TlsRootConfig, TransportDefaults,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use engine::FetchEngine;
pub use error::{HttpError, InvalidUriKind};
pub use layers::{DefaultHeaderLayer, DefaultHeaderService, FetchRedirectPolicy, RetryLayer, RetryService};
pub use logger::{LeveledLogger, SharedLogger, TracingLogger};
pub use policy::{Backoff, Decision, RetryPolicy};
pub use request::{FetchMethod, FetchRequest, RetrySettings, validate_url};
pub use response::{
    FetchOutcome, FetchResult, ResponseBody, canonical_header_name, flatten_headers,
    parse_retry_after,
};
