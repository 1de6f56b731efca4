//! # Geohash index adapter
//!
//! Encodes site coordinates into sortable geohash keys and covers a search
//! circle with a handful of half-open key ranges. The ranges over-approximate
//! the circle; `proximity::refine` removes the corner hits.

use domains::{DomainError, GeoPoint, GeohashRange};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const BITS_PER_CHAR: u32 = 5;

/// Characters in a stored site geohash (cells of roughly 1.2m x 0.6m).
pub const GEOHASH_PRECISION: usize = 10;

/// Query bounds never go finer than the stored keys, otherwise a range start
/// could sort after the shorter stored key it is meant to match.
const MAX_QUERY_BITS: u32 = GEOHASH_PRECISION as u32 * BITS_PER_CHAR;

const EARTH_MERIDIONAL_CIRCUMFERENCE_M: f64 = 40_007_860.0;
const EARTH_EQ_RADIUS_M: f64 = 6_378_137.0;
const METERS_PER_DEGREE_LATITUDE: f64 = 110_574.0;
/// WGS84 first eccentricity squared.
const E2: f64 = 0.006_694_478_197_99;
const EPSILON: f64 = 1e-12;

/// Sorts after every base32 character.
const RANGE_END_SENTINEL: char = '~';

/// Geohash of `point` at the stored precision.
pub fn encode(point: GeoPoint) -> Result<String, DomainError> {
    encode_with_precision(point, GEOHASH_PRECISION)
}

pub fn encode_with_precision(point: GeoPoint, precision: usize) -> Result<String, DomainError> {
    let point = point.validated()?;

    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lng_lo, mut lng_hi) = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut bit_count = 0;
    let mut even = true;

    while hash.len() < precision {
        if even {
            let mid = (lng_lo + lng_hi) / 2.0;
            if point.lng > mid {
                bits = (bits << 1) | 1;
                lng_lo = mid;
            } else {
                bits <<= 1;
                lng_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if point.lat > mid {
                bits = (bits << 1) | 1;
                lat_lo = mid;
            } else {
                bits <<= 1;
                lat_hi = mid;
            }
        }
        even = !even;
        bit_count += 1;

        if bit_count == BITS_PER_CHAR {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    Ok(hash)
}

/// Key ranges whose union covers the circle of `radius_m` around `center`.
///
/// Callers issue one range query per entry and union the matches. The result
/// is deduplicated and sorted, at most nine entries.
pub fn bounds_for_circle(center: GeoPoint, radius_m: f64) -> Result<Vec<GeohashRange>, DomainError> {
    let center = center.validated()?;
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Err(DomainError::InvalidRadius(radius_m));
    }

    if wraps_the_globe(center, radius_m) {
        return latitude_band_ranges(center, radius_m);
    }

    let query_bits = bounding_box_bits(center, radius_m).max(1);
    let precision = query_bits.div_ceil(BITS_PER_CHAR) as usize;

    let mut ranges = Vec::with_capacity(9);
    for corner in bounding_box_points(center, radius_m) {
        let hash = encode_with_precision(corner, precision)?;
        let range = range_for_prefix(&hash, query_bits);
        if !ranges.contains(&range) {
            ranges.push(range);
        }
    }
    ranges.sort_by(|a, b| a.start.cmp(&b.start));
    Ok(ranges)
}

/// True when the circle reaches a pole or spans half the globe's longitude.
/// The nine compass points collapse onto one meridian in that case.
fn wraps_the_globe(center: GeoPoint, radius_m: f64) -> bool {
    let (lat_south, lat_north) = latitude_span(center, radius_m);
    let lng_degrees = meters_to_longitude_degrees(radius_m, lat_north)
        .max(meters_to_longitude_degrees(radius_m, lat_south));
    lat_north >= 90.0 || lat_south <= -90.0 || lng_degrees >= 180.0
}

fn latitude_span(center: GeoPoint, radius_m: f64) -> (f64, f64) {
    let lat_degrees = radius_m / METERS_PER_DEGREE_LATITUDE;
    (
        (center.lat - lat_degrees).max(-90.0),
        (center.lat + lat_degrees).min(90.0),
    )
}

/// Every longitude across the circle's latitude span, as cells of `k`
/// longitude bits by `k` latitude bits. `k` is the finest level that still
/// fits in nine ranges.
fn latitude_band_ranges(center: GeoPoint, radius_m: f64) -> Result<Vec<GeohashRange>, DomainError> {
    let (lat_south, lat_north) = latitude_span(center, radius_m);

    let (k, first_row, last_row) = (1..=3u32)
        .rev()
        .map(|k| {
            let cells = 1u32 << k;
            let height = 180.0 / f64::from(cells);
            let row = |lat: f64| (((lat + 90.0) / height).floor() as u32).min(cells - 1);
            (k, row(lat_south), row(lat_north))
        })
        .find(|&(k, first, last)| (last - first + 1) << k <= 9)
        .unwrap_or((1, 0, 1));

    let cells = 1u32 << k;
    let height = 180.0 / f64::from(cells);
    let width = 360.0 / f64::from(cells);
    let precision = (2 * k).div_ceil(BITS_PER_CHAR) as usize;

    let mut ranges = Vec::with_capacity(9);
    for row in first_row..=last_row {
        for column in 0..cells {
            let cell_center = GeoPoint::new(
                -90.0 + (f64::from(row) + 0.5) * height,
                -180.0 + (f64::from(column) + 0.5) * width,
            );
            let hash = encode_with_precision(cell_center, precision)?;
            let range = range_for_prefix(&hash, 2 * k);
            if !ranges.contains(&range) {
                ranges.push(range);
            }
        }
    }
    ranges.sort_by(|a, b| a.start.cmp(&b.start));
    Ok(ranges)
}

/// Range covering every key that shares the leading `bits` of `hash`.
fn range_for_prefix(hash: &str, bits: u32) -> GeohashRange {
    let precision = bits.div_ceil(BITS_PER_CHAR) as usize;
    if hash.len() < precision {
        return GeohashRange {
            start: hash.to_string(),
            end: format!("{hash}{RANGE_END_SENTINEL}"),
        };
    }

    let hash = &hash[..precision];
    let base = &hash[..precision - 1];
    let last = hash.as_bytes()[precision - 1];
    let last_value = BASE32.iter().position(|&c| c == last).unwrap_or(0) as u32;

    let significant_bits = bits - (base.len() as u32) * BITS_PER_CHAR;
    let unused_bits = BITS_PER_CHAR - significant_bits;
    let start_value = (last_value >> unused_bits) << unused_bits;
    let end_value = start_value + (1 << unused_bits);

    let start = format!("{base}{}", BASE32[start_value as usize] as char);
    let end = if end_value > 31 {
        format!("{base}{RANGE_END_SENTINEL}")
    } else {
        format!("{base}{}", BASE32[end_value as usize] as char)
    };
    GeohashRange { start, end }
}

/// Number of geohash bits whose cell is still at least `size_m` across at
/// every latitude the circle touches.
fn bounding_box_bits(center: GeoPoint, size_m: f64) -> u32 {
    let lat_delta = size_m / METERS_PER_DEGREE_LATITUDE;
    let lat_north = (center.lat + lat_delta).min(90.0);
    let lat_south = (center.lat - lat_delta).max(-90.0);

    let bits_lat = (latitude_bits_for_resolution(size_m).floor() as i64) * 2;
    let bits_lng_north = (longitude_bits_for_resolution(size_m, lat_north).floor() as i64) * 2 - 1;
    let bits_lng_south = (longitude_bits_for_resolution(size_m, lat_south).floor() as i64) * 2 - 1;

    bits_lat
        .min(bits_lng_north)
        .min(bits_lng_south)
        .clamp(0, MAX_QUERY_BITS as i64) as u32
}

fn latitude_bits_for_resolution(resolution_m: f64) -> f64 {
    (EARTH_MERIDIONAL_CIRCUMFERENCE_M / 2.0 / resolution_m)
        .log2()
        .min(MAX_QUERY_BITS as f64)
}

fn longitude_bits_for_resolution(resolution_m: f64, lat: f64) -> f64 {
    let degrees = meters_to_longitude_degrees(resolution_m, lat);
    if degrees.abs() > 0.000_001 {
        (360.0 / degrees).log2().max(1.0)
    } else {
        1.0
    }
}

fn meters_to_longitude_degrees(distance_m: f64, lat: f64) -> f64 {
    let radians = lat.to_radians();
    let numerator = radians.cos() * EARTH_EQ_RADIUS_M * std::f64::consts::PI / 180.0;
    let denominator = 1.0 / (1.0 - E2 * radians.sin().powi(2)).sqrt();
    let delta_degrees = numerator * denominator;
    if delta_degrees < EPSILON {
        if distance_m > 0.0 {
            360.0
        } else {
            0.0
        }
    } else {
        (distance_m / delta_degrees).min(360.0)
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    let adjusted = lng + 180.0;
    if adjusted > 0.0 {
        adjusted % 360.0 - 180.0
    } else {
        180.0 - (-adjusted % 360.0)
    }
}

/// Center plus the eight compass points of the circle's bounding box.
fn bounding_box_points(center: GeoPoint, radius_m: f64) -> [GeoPoint; 9] {
    let (lat_south, lat_north) = latitude_span(center, radius_m);
    let lng_degrees = meters_to_longitude_degrees(radius_m, lat_north)
        .max(meters_to_longitude_degrees(radius_m, lat_south));
    let west = wrap_longitude(center.lng - lng_degrees);
    let east = wrap_longitude(center.lng + lng_degrees);

    [
        GeoPoint::new(center.lat, center.lng),
        GeoPoint::new(center.lat, west),
        GeoPoint::new(center.lat, east),
        GeoPoint::new(lat_north, center.lng),
        GeoPoint::new(lat_north, west),
        GeoPoint::new(lat_north, east),
        GeoPoint::new(lat_south, center.lng),
        GeoPoint::new(lat_south, west),
        GeoPoint::new(lat_south, east),
    ]
}
