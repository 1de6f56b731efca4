//! Search over the in-memory geohash index: proximity, narrowing filters,
//! ordering and pagination.

use chrono::{Duration, Utc};

use domains::{DomainError, GeoPoint, Site, Visibility};
use integration_tests::{site, site_at, Harness};
use services::geohash;
use services::search::{SearchFilters, SortKey};

fn near(lat: f64, lng: f64, radius: f64) -> SearchFilters {
    SearchFilters {
        lat: Some(lat),
        lng: Some(lng),
        radius: Some(radius),
        ..Default::default()
    }
}

fn titles(response: &services::search::SearchResponse) -> Vec<&str> {
    response.results.iter().map(|s| s.title.as_str()).collect()
}

#[tokio::test]
async fn radius_filter_uses_true_distance() {
    let h = Harness::new();
    h.insert(site(40.0, -105.0, "Boulder Flats")).await;

    let wide = h.search.search(near(40.0, -105.01, 5.0)).await.unwrap();
    assert_eq!(titles(&wide), vec!["Boulder Flats"]);
    assert_eq!(wide.results[0].distance_miles, Some(0.53));

    let tight = h.search.search(near(40.0, -105.01, 0.1)).await.unwrap();
    assert!(tight.results.is_empty());
    assert_eq!(tight.pagination.total, 0);
}

#[tokio::test]
async fn far_sites_sharing_no_cell_are_not_returned() {
    let h = Harness::new();
    h.insert(site(40.0, -105.0, "Near")).await;
    h.insert(site(40.3, -105.0, "Twenty Miles North")).await;
    h.insert(site(-33.9, 151.2, "Other Hemisphere")).await;

    let response = h.search.search(near(40.0, -105.0, 10.0)).await.unwrap();
    assert_eq!(titles(&response), vec!["Near"]);
}

#[tokio::test]
async fn circles_over_the_pole_find_sites_across_the_meridian() {
    let h = Harness::new();
    h.insert(site(80.0, 10.0, "East of Center")).await;
    h.insert(site(89.5, 180.0, "Over the Top")).await;
    h.insert(site(60.0, 0.0, "Too Far South")).await;

    let response = h.search.search(near(80.0, 0.0, 800.0)).await.unwrap();
    let mut found = titles(&response);
    found.sort();
    assert_eq!(found, vec!["East of Center", "Over the Top"]);
}

#[tokio::test]
async fn only_public_sites_are_searchable() {
    let h = Harness::new();
    h.insert(site(40.0, -105.0, "Open Meadow")).await;
    for visibility in [Visibility::Private, Visibility::Unlisted] {
        let mut hidden = site(40.0, -105.001, "Secret Spot");
        hidden.visibility = visibility;
        h.insert(hidden).await;
    }

    let nearby = h.search.search(near(40.0, -105.0, 2.0)).await.unwrap();
    assert_eq!(titles(&nearby), vec!["Open Meadow"]);

    let everywhere = h.search.search(SearchFilters::default()).await.unwrap();
    assert_eq!(titles(&everywhere), vec!["Open Meadow"]);
}

#[tokio::test]
async fn narrowing_filters_compose() {
    let h = Harness::new();
    let mut rated = site(40.0, -105.0, "Aspen Grove");
    rated.average_rating = Some(4.5);
    rated.review_count = 2;
    rated.has_photos = true;
    rated.description = "Quiet creekside spot".into();
    h.insert(rated).await;

    let mut low = site(40.0, -105.002, "Dusty Pullout");
    low.average_rating = Some(2.0);
    low.review_count = 1;
    h.insert(low).await;

    h.insert(site(40.0, -105.004, "Unrated Creek")).await;

    let min_rating = h
        .search
        .search(SearchFilters {
            min_rating: Some(4.0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&min_rating), vec!["Aspen Grove"]);

    let photos = h
        .search
        .search(SearchFilters {
            has_photos: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&photos), vec!["Aspen Grove"]);

    // Text matches title or description, case-insensitively.
    let mut creek = h
        .search
        .search(SearchFilters {
            q: Some("  CREEK ".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut found = titles(&creek);
    found.sort();
    assert_eq!(found, vec!["Aspen Grove", "Unrated Creek"]);
    assert_eq!(creek.filters.q.as_deref(), Some("creek"));

    creek = h
        .search
        .search(SearchFilters {
            q: Some("creek".into()),
            min_rating: Some(1.0),
            ..near(40.0, -105.0, 1.0)
        })
        .await
        .unwrap();
    assert_eq!(titles(&creek), vec!["Aspen Grove"]);
}

#[tokio::test]
async fn identical_searches_return_identical_pages() {
    let h = Harness::new();
    let now = Utc::now();
    for i in 0..15 {
        // Several sites share a timestamp so the id tie-break is exercised.
        let created = now - Duration::minutes(i / 3);
        h.insert(site_at(40.0 + i as f64 * 0.001, -105.0, &format!("Site {i}"), created))
            .await;
    }

    for sort in [SortKey::Newest, SortKey::Rating, SortKey::Distance] {
        let filters = SearchFilters {
            sort: Some(sort),
            page_size: Some(7),
            ..near(40.0, -105.0, 5.0)
        };
        let first = h.search.search(filters.clone()).await.unwrap();
        let second = h.search.search(filters).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.pagination.total, 15);
    }
}

#[tokio::test]
async fn distance_sort_orders_nearest_first() {
    let h = Harness::new();
    h.insert(site(40.0, -105.03, "Far")).await;
    h.insert(site(40.0, -105.0, "Here")).await;
    h.insert(site(40.0, -105.01, "Close")).await;

    let response = h
        .search
        .search(SearchFilters {
            sort: Some(SortKey::Distance),
            ..near(40.0, -105.0, 10.0)
        })
        .await
        .unwrap();
    assert_eq!(titles(&response), vec!["Here", "Close", "Far"]);
    assert_eq!(response.filters.sort, SortKey::Distance);
}

#[tokio::test]
async fn distance_sort_without_location_falls_back_to_newest() {
    let h = Harness::new();
    let now = Utc::now();
    h.insert(site_at(40.0, -105.0, "Older", now - Duration::days(2))).await;
    h.insert(site_at(41.0, -106.0, "Newer", now)).await;

    let response = h
        .search
        .search(SearchFilters {
            sort: Some(SortKey::Distance),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&response), vec!["Newer", "Older"]);
    assert_eq!(response.filters.sort, SortKey::Newest);
    assert!(response.results.iter().all(|s| s.distance_miles.is_none()));
}

#[tokio::test]
async fn rating_sort_puts_unrated_last() {
    let h = Harness::new();
    let rated = |title: &str, rating: Option<f64>| -> Site {
        let mut s = site(40.0, -105.0, title);
        s.average_rating = rating;
        s
    };
    h.insert(rated("Three", Some(3.0))).await;
    h.insert(rated("None", None)).await;
    h.insert(rated("Five", Some(5.0))).await;

    let response = h
        .search
        .search(SearchFilters {
            sort: Some(SortKey::Rating),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&response), vec!["Five", "Three", "None"]);
}

#[tokio::test]
async fn page_size_is_capped() {
    let h = Harness::new();
    for i in 0..120 {
        h.insert(site(10.0, i as f64 * 0.5, &format!("Site {i}"))).await;
    }

    let first = h
        .search
        .search(SearchFilters {
            page_size: Some(500),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first.results.len(), 100);
    assert_eq!(first.pagination.page_size, 100);
    assert_eq!(first.pagination.total, 120);
    assert_eq!(first.pagination.total_pages, 2);

    let second = h
        .search
        .search(SearchFilters {
            page: Some(2),
            page_size: Some(500),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.results.len(), 20);

    let default = h.search.search(SearchFilters::default()).await.unwrap();
    assert_eq!(default.results.len(), 20);
}

#[tokio::test]
async fn invalid_location_filters_are_rejected() {
    let h = Harness::new();
    assert_eq!(
        h.search.search(near(40.0, -105.0, 0.0)).await,
        Err(DomainError::InvalidRadius(0.0))
    );
    assert!(matches!(
        h.search.search(near(95.0, -105.0, 5.0)).await,
        Err(DomainError::InvalidCoordinate { .. })
    ));

    // Without a radius the location is not a filter at all.
    h.insert(site(40.0, -105.0, "Anywhere")).await;
    let partial = h
        .search
        .search(SearchFilters {
            lat: Some(95.0),
            lng: Some(-105.0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&partial), vec!["Anywhere"]);
}

#[tokio::test]
async fn store_outage_is_search_unavailable() {
    let h = Harness::new();
    h.insert(site(40.0, -105.0, "Camp")).await;
    h.store.set_unavailable(true);

    for filters in [SearchFilters::default(), near(40.0, -105.0, 5.0)] {
        let err = h.search.search(filters).await.unwrap_err();
        assert!(matches!(err, DomainError::SearchUnavailable(_)));
    }
}

#[test]
fn every_point_is_covered_by_its_own_bounds() {
    let points = [
        (40.0, -105.0),
        (0.0, 0.0),
        (89.9, 179.9),
        (-89.9, -179.9),
        (51.5074, -0.1278),
        (-33.8688, 151.2093),
    ];
    for (lat, lng) in points {
        let point = GeoPoint::new(lat, lng);
        let hash = geohash::encode(point).unwrap();
        for radius in [1.0, 150.0, 5_000.0, 80_000.0, 2_000_000.0] {
            let bounds = geohash::bounds_for_circle(point, radius).unwrap();
            assert!(
                bounds.iter().any(|b| b.contains(&hash)),
                "({lat}, {lng}) r={radius}"
            );
        }
    }
}
