//! # Errors
//!
//! `DomainError` is what services return to callers. `StoreError` is what
//! ports return to services; services decide which domain kind a backend
//! failure becomes.

use thiserror::Error;

use crate::models::{ReviewId, SiteId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("invalid search radius {0}")]
    InvalidRadius(f64),

    #[error("rating must be an integer between 1 and 5")]
    InvalidRating,

    #[error("comments require a signed-in author")]
    CommentRequiresIdentity,

    #[error("comment is {len} characters, the limit is {max}")]
    CommentTooLong { len: usize, max: usize },

    #[error("a reason is required to flag a review")]
    ReasonRequired,

    #[error("authentication required")]
    Unauthenticated,

    #[error("site {0} not found")]
    SiteNotFound(SiteId),

    #[error("review {0} not found")]
    ReviewNotFound(ReviewId),

    /// Ownership violation.
    #[error("not allowed to modify this review")]
    Forbidden,

    #[error("an anonymous rating for this site was already submitted from this network in the last 24 hours")]
    RateLimited,

    #[error("review already flagged by this user")]
    AlreadyFlagged,

    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl DomainError {
    /// Stable machine-readable code, used in API bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCoordinate { .. } => "invalid_coordinate",
            Self::InvalidRadius(_) => "invalid_radius",
            Self::InvalidRating => "invalid_rating",
            Self::CommentRequiresIdentity => "comment_requires_identity",
            Self::CommentTooLong { .. } => "comment_too_long",
            Self::ReasonRequired => "reason_required",
            Self::Unauthenticated => "unauthenticated",
            Self::SiteNotFound(_) => "site_not_found",
            Self::ReviewNotFound(_) => "review_not_found",
            Self::Forbidden => "forbidden",
            Self::RateLimited => "rate_limited",
            Self::AlreadyFlagged => "already_flagged",
            Self::SearchUnavailable(_) => "search_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Input problems the caller can fix and resubmit.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidCoordinate { .. }
                | Self::InvalidRadius(_)
                | Self::InvalidRating
                | Self::CommentRequiresIdentity
                | Self::CommentTooLong { .. }
                | Self::ReasonRequired
        )
    }

    /// Policy rejections: the request was understood and refused.
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            Self::Forbidden | Self::RateLimited | Self::AlreadyFlagged
        )
    }

    /// Transient backend trouble; retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SearchUnavailable(_) | Self::StoreUnavailable(_))
    }
}

/// Failure reported by a storage port.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("transaction aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    pub fn into_search(self) -> DomainError {
        DomainError::SearchUnavailable(self.to_string())
    }

    pub fn into_store(self) -> DomainError {
        DomainError::StoreUnavailable(self.to_string())
    }
}

/// Failure reported by a display-name lookup. Always swallowed by services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no such user")]
    NotFound,

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}
