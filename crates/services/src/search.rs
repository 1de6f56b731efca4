//! # Search query planner
//!
//! Public campsite search. With a location filter the candidate set comes
//! from geohash range scans refined by true distance; without one it is a
//! full scan of public sites, bounded on the way out by the page-size cap.

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use domains::{DomainError, GeoPoint, Site, SiteId, SiteStore, Visibility};

use crate::geohash;
use crate::proximity::{self, Nearby};
use crate::utils::{clamp_page, Pagination};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Newest,
    Rating,
    ReviewCount,
    /// Only honoured with a location filter; falls back to `Newest`.
    Distance,
}

/// Every field is optional and filters compose by intersection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Miles.
    pub radius: Option<f64>,
    pub min_rating: Option<f64>,
    pub has_photos: Option<bool>,
    pub sort: Option<SortKey>,
    pub page: Option<u32>,
    #[serde(alias = "limit")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Public-safe projection of a site. No owner, no geohash, no moderation
/// state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub id: SiteId,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub average_rating: Option<f64>,
    pub review_count: u32,
    pub has_photos: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SiteSummary {
    fn project(site: Site, distance_m: Option<f64>) -> Self {
        Self {
            id: site.id,
            title: site.title,
            description: site.description,
            latitude: site.location.lat,
            longitude: site.location.lng,
            average_rating: site.average_rating,
            review_count: site.review_count,
            has_photos: site.has_photos,
            distance_miles: distance_m.map(|m| crate::consistency::round2(proximity::meters_to_miles(m))),
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

/// The filters as actually applied, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilters {
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
    pub min_rating: Option<f64>,
    pub has_photos: Option<bool>,
    pub sort: SortKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SiteSummary>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
}

struct GeoFilter {
    center: GeoPoint,
    radius_miles: f64,
}

struct Candidate {
    site: Site,
    distance_m: Option<f64>,
}

pub struct SearchService {
    sites: Arc<dyn SiteStore>,
    limits: SearchLimits,
}

impl SearchService {
    pub fn new(sites: Arc<dyn SiteStore>, limits: SearchLimits) -> Self {
        Self { sites, limits }
    }

    pub async fn search(&self, filters: SearchFilters) -> Result<SearchResponse, DomainError> {
        let geo = geo_filter(&filters)?;
        let text = filters
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let candidates = match &geo {
            Some(geo) => self.nearby(geo).await?,
            None => self.all_public().await?,
        };

        let mut matched: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.site.visibility == Visibility::Public)
            .filter(|c| match filters.min_rating {
                Some(min) => c.site.average_rating.is_some_and(|r| r >= min),
                None => true,
            })
            .filter(|c| match filters.has_photos {
                Some(wanted) => c.site.has_photos == wanted,
                None => true,
            })
            .filter(|c| match &text {
                Some(q) => matches_text(&c.site, q),
                None => true,
            })
            .collect();

        let sort = match filters.sort.unwrap_or_default() {
            SortKey::Distance if geo.is_none() => SortKey::Newest,
            key => key,
        };
        matched.sort_by(|a, b| compare(sort, a, b));

        let (page, page_size) = clamp_page(
            filters.page,
            filters.page_size,
            self.limits.default_page_size,
            self.limits.max_page_size,
        );
        let pagination = Pagination::new(page, page_size, matched.len());
        let results = pagination
            .slice(matched)
            .into_iter()
            .map(|c| SiteSummary::project(c.site, c.distance_m))
            .collect();

        Ok(SearchResponse {
            results,
            pagination,
            filters: AppliedFilters {
                q: text,
                lat: geo.as_ref().map(|g| g.center.lat),
                lng: geo.as_ref().map(|g| g.center.lng),
                radius: geo.as_ref().map(|g| g.radius_miles),
                min_rating: filters.min_rating,
                has_photos: filters.has_photos,
                sort,
            },
        })
    }

    /// One range query per geohash bound, unioned by id, then refined by
    /// great-circle distance.
    async fn nearby(&self, geo: &GeoFilter) -> Result<Vec<Candidate>, DomainError> {
        let radius_m = proximity::miles_to_meters(geo.radius_miles);
        let bounds = geohash::bounds_for_circle(geo.center, radius_m)?;

        let batches = try_join_all(
            bounds
                .iter()
                .map(|range| self.sites.sites_in_range(range, Visibility::Public)),
        )
        .await
        .map_err(|e| e.into_search())?;

        let mut union: HashMap<SiteId, Site> = HashMap::new();
        for site in batches.into_iter().flatten() {
            union.entry(site.id).or_insert(site);
        }
        debug!(bounds = bounds.len(), candidates = union.len(), "geohash range scan");

        Ok(proximity::refine(union.into_values().collect(), geo.center, radius_m)
            .into_iter()
            .map(|Nearby { site, distance_m }| Candidate {
                site,
                distance_m: Some(distance_m),
            })
            .collect())
    }

    async fn all_public(&self) -> Result<Vec<Candidate>, DomainError> {
        let sites = self
            .sites
            .sites_with_visibility(Visibility::Public)
            .await
            .map_err(|e| e.into_search())?;
        Ok(sites
            .into_iter()
            .map(|site| Candidate {
                site,
                distance_m: None,
            })
            .collect())
    }
}

/// A location filter needs all of lat, lng and radius; a partial one is
/// ignored.
fn geo_filter(filters: &SearchFilters) -> Result<Option<GeoFilter>, DomainError> {
    let (Some(lat), Some(lng), Some(radius)) = (filters.lat, filters.lng, filters.radius) else {
        return Ok(None);
    };
    let center = GeoPoint::new(lat, lng).validated()?;
    if !radius.is_finite() || radius <= 0.0 {
        return Err(DomainError::InvalidRadius(radius));
    }
    Ok(Some(GeoFilter {
        center,
        radius_miles: radius,
    }))
}

fn matches_text(site: &Site, needle_lower: &str) -> bool {
    site.title.to_lowercase().contains(needle_lower)
        || site.description.to_lowercase().contains(needle_lower)
}

fn newest_first(a: &Site, b: &Site) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Total order for every key so identical searches return identical pages.
fn compare(sort: SortKey, a: &Candidate, b: &Candidate) -> Ordering {
    let primary = match sort {
        SortKey::Newest => Ordering::Equal,
        SortKey::Rating => desc_nones_last(a.site.average_rating, b.site.average_rating),
        SortKey::ReviewCount => b.site.review_count.cmp(&a.site.review_count),
        SortKey::Distance => a
            .distance_m
            .unwrap_or(f64::INFINITY)
            .total_cmp(&b.distance_m.unwrap_or(f64::INFINITY)),
    };
    primary.then_with(|| newest_first(&a.site, &b.site))
}

fn desc_nones_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
