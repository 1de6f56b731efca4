use std::net::IpAddr;
use std::sync::Arc;

use domains::IdentityResolver;
use services::{ReviewService, SearchService, SiteService};

use crate::metrics::Metrics;

/// Shared by every request; cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchService>,
    pub sites: Arc<SiteService>,
    pub reviews: Arc<ReviewService>,
    pub identity: Arc<dyn IdentityResolver>,
    pub metrics: Arc<Metrics>,
    /// Peers allowed to report the client address via `X-Forwarded-For`.
    pub trusted_proxies: Arc<[IpAddr]>,
}
