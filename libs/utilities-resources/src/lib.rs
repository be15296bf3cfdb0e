#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Managed resources of the `utilities` provider.
//!
//! - `utilities_nanoid`: a random id generated once
//! - `utilities_http`: an HTTP fetch whose result is kept in state
//! - `utilities_file`: the body of a URL downloaded once
//!
//! Each resource implements [`Resource`]; [`Provider`] exposes them by type
//! name as [`DynResource`] trait objects working on JSON values.

pub mod file;
pub mod http;
pub mod nanoid;
mod provider;
mod resource;

pub use crate::nanoid::{NanoidConfig, NanoidResource, NanoidState};
pub use file::{FileConfig, FileResource, FileState};
pub use http::{HttpConfig, HttpResource, HttpState};
pub use provider::{PROVIDER_TYPE_NAME, Provider};
pub use resource::{
    Applied, ConfigError, DynResource, Erased, Keepers, Resource, ResourceResult,
    import_not_implemented,
};
