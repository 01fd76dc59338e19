//! Request driver for Stampede
//!
//! Every HTTP call a virtual user makes goes through [`RequestDriver`], which
//! times it, applies the per-request timeout and cancellation, and records the
//! outcome in the shared metrics registry. Failures never escape as errors:
//! the caller always gets a [`RequestResult`] and decides what to do with it.

pub mod config;
pub mod driver;
pub mod errors;
pub mod types;

// Re-export main types for convenience
pub use config::DriverConfig;
pub use driver::{HttpClient, RequestDriver};
pub use errors::HttpError;
pub use types::{HttpMethod, HttpMethodError, RequestBody, RequestResult, RequestSpec};
