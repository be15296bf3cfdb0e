//! Tower layers composed by [`crate::builder`] for each fetch.
//!
//! - [`RetryLayer`] runs the policy-driven retry loop
//! - [`DefaultHeaderLayer`] fills in headers the caller did not set
//! - [`FetchRedirectPolicy`] decides which redirects are followed

mod default_header;
mod redirect;
mod retry;

pub use default_header::{DefaultHeaderLayer, DefaultHeaderService};
pub use redirect::FetchRedirectPolicy;
pub use retry::{RetryLayer, RetryService};
