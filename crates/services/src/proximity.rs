//! # Proximity filter
//!
//! Geohash ranges are rectangles; the search area is a circle. Every
//! candidate pulled from the ranges is re-measured here and dropped if it
//! sits outside the radius.

use domains::{GeoPoint, Site};
use tracing::debug;

/// Mean earth radius used for great-circle distance.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub const METERS_PER_MILE: f64 = 1_609.344;

pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Haversine distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// A site that survived the radius check, with its distance to the center.
#[derive(Debug, Clone, PartialEq)]
pub struct Nearby {
    pub site: Site,
    pub distance_m: f64,
}

/// Keeps candidates within `radius_m` of `center`, annotated with distance.
///
/// Candidates with unusable coordinates are dropped.
pub fn refine(candidates: Vec<Site>, center: GeoPoint, radius_m: f64) -> Vec<Nearby> {
    let scanned = candidates.len();
    let nearby: Vec<Nearby> = candidates
        .into_iter()
        .filter(|site| site.location.is_valid())
        .filter_map(|site| {
            let distance_m = haversine_m(center, site.location);
            (distance_m <= radius_m).then_some(Nearby { site, distance_m })
        })
        .collect();
    debug!(scanned, kept = nearby.len(), radius_m, "proximity refine");
    nearby
}
