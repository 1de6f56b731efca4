//! # api-adapters
//!
//! The HTTP surface for campsite search and reviews. Handlers translate
//! requests into service calls and `DomainError`s into status codes;
//! nothing in here decides policy.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod http;

pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use http::{router, AppState};
