//! # Domain Models
//!
//! Sites, their reviews, and the records that hang off them.
//! Identifiers are UUID v4 wrapped in newtypes so a `SiteId` can never be
//! passed where a `ReviewId` is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::DomainError;

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Distinct flaggers needed before a review is hidden.
pub const FLAG_HIDE_THRESHOLD: u32 = 3;

/// Rolling window, in hours, for one anonymous rating per origin and site.
pub const ANONYMOUS_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub Uuid);

impl SiteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(pub Uuid);

impl ReviewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque subject issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verified requester, as returned by the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: None,
            email: None,
            email_verified: false,
        }
    }
}

/// Best-effort display data for a review author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorDisplay {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl From<&Identity> for AuthorDisplay {
    /// Unverified emails are not shown.
    fn from(identity: &Identity) -> Self {
        Self {
            display_name: identity.display_name.clone(),
            email: identity
                .email
                .clone()
                .filter(|_| identity.email_verified),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Returns the point back if it lies on the globe.
    pub fn validated(self) -> Result<Self, DomainError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(DomainError::InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Unlisted,
    Public,
}

/// A campsite. `average_rating` and `review_count` are derived and only
/// written through a `SiteTransaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub owner_id: UserId,
    pub location: GeoPoint,
    /// Computed once at creation; coordinates never change afterwards.
    pub geohash: String,
    pub visibility: Visibility,
    pub title: String,
    pub description: String,
    pub average_rating: Option<f64>,
    pub review_count: u32,
    pub has_photos: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn aggregate(&self) -> Aggregate {
        Aggregate {
            average_rating: self.average_rating,
            review_count: self.review_count,
        }
    }
}

/// The derived rating state of a site.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub average_rating: Option<f64>,
    pub review_count: u32,
}

/// An integer star rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, DomainError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(DomainError::InvalidRating)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    pub flagger_id: UserId,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

/// A single rating of a site.
///
/// `author_id == None` marks an anonymous review; those carry the hashed
/// network origin instead and may never have a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub site_id: SiteId,
    pub author_id: Option<UserId>,
    pub origin: Option<String>,
    pub rating: Rating,
    pub comment: Option<String>,
    pub flag_count: u32,
    pub flags: Vec<FlagRecord>,
    /// Once set, never cleared.
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn is_anonymous(&self) -> bool {
        self.author_id.is_none()
    }

    pub fn is_authored_by(&self, user: &UserId) -> bool {
        self.author_id.as_ref() == Some(user)
    }

    pub fn has_flag_from(&self, user: &UserId) -> bool {
        self.flags.iter().any(|f| &f.flagger_id == user)
    }
}

/// Ledger row written with every accepted anonymous review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub origin: String,
    pub site_id: SiteId,
    pub created_at: DateTime<Utc>,
}

/// A half-open `[start, end)` range over geohash strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeohashRange {
    pub start: String,
    pub end: String,
}

impl GeohashRange {
    pub fn contains(&self, geohash: &str) -> bool {
        self.start.as_str() <= geohash && geohash < self.end.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_accepts_one_through_five() {
        for v in 1..=5 {
            assert_eq!(Rating::new(v).unwrap().value() as i64, v);
        }
        assert!(matches!(Rating::new(0), Err(DomainError::InvalidRating)));
        assert!(matches!(Rating::new(6), Err(DomainError::InvalidRating)));
    }

    #[test]
    fn rating_deserialization_is_validated() {
        assert!(serde_json::from_str::<Rating>("4").is_ok());
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint::new(90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(90.1, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -180.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn geohash_range_is_half_open() {
        let range = GeohashRange {
            start: "9x".into(),
            end: "9z".into(),
        };
        assert!(range.contains("9x"));
        assert!(range.contains("9xj5"));
        assert!(range.contains("9y"));
        assert!(!range.contains("9z"));
        assert!(!range.contains("9w"));
    }

    #[test]
    fn visibility_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Visibility::Unlisted).unwrap(),
            "\"unlisted\""
        );
    }
}
