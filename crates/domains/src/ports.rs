//! # Ports
//!
//! Contracts the services depend on. Any backing store, identity provider,
//! or user directory must implement these to be wired into the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::errors::{DomainError, LookupError, StoreError};
use crate::models::{
    Aggregate, AuthorDisplay, GeohashRange, Identity, RateLimitEntry, Review, ReviewId, Site,
    SiteId, UserId, Visibility,
};

/// Site documents and the geohash-ordered index over them.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn get_site(&self, id: SiteId) -> Result<Option<Site>, StoreError>;

    async fn insert_site(&self, site: Site) -> Result<(), StoreError>;

    /// Sites whose geohash falls in `[range.start, range.end)` and whose
    /// visibility equals `visibility`.
    async fn sites_in_range(
        &self,
        range: &GeohashRange,
        visibility: Visibility,
    ) -> Result<Vec<Site>, StoreError>;

    /// Equality scan on visibility.
    async fn sites_with_visibility(&self, visibility: Visibility) -> Result<Vec<Site>, StoreError>;
}

/// Review documents plus the transaction primitive used for every write.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, StoreError>;

    /// Every review of a site, hidden ones included.
    async fn reviews_for_site(&self, site_id: SiteId) -> Result<Vec<Review>, StoreError>;

    /// Opens a serializable transaction scoped to one site. Transactions on
    /// the same site run one at a time; nothing is visible to readers until
    /// `commit`.
    async fn begin(&self, site_id: SiteId) -> Result<Box<dyn SiteTransaction>, StoreError>;
}

/// A unit of work over one site, its reviews, and its rate-limit ledger.
///
/// Reads observe this transaction's own staged writes.
#[async_trait]
pub trait SiteTransaction: Send {
    fn site_id(&self) -> SiteId;

    async fn site(&mut self) -> Result<Option<Site>, StoreError>;

    async fn reviews(&mut self) -> Result<Vec<Review>, StoreError>;

    async fn latest_rate_limit(
        &mut self,
        origin: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    fn put_review(&mut self, review: Review);

    fn delete_review(&mut self, id: ReviewId);

    fn put_rate_limit(&mut self, entry: RateLimitEntry);

    fn set_aggregate(&mut self, aggregate: Aggregate);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Bearer credential verification. Implemented outside the core.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Fails with `DomainError::Unauthenticated` on any bad credential.
    async fn resolve(&self, bearer: &str) -> Result<Identity, DomainError>;
}

/// Best-effort author display lookup.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait DisplayNameLookup: Send + Sync {
    async fn display_for(&self, user: &UserId) -> Result<AuthorDisplay, LookupError>;

    /// Records the display data a verified identity carries.
    async fn remember(&self, identity: &Identity) -> Result<(), LookupError>;
}
