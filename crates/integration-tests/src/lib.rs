//! Shared fixtures for the integration suites: one in-memory store wired
//! into every service, plus helpers for seeding sites and checking the
//! aggregate invariant.

#[cfg(feature = "web-axum")]
pub mod http;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

use auth_adapters::JwtIdentityResolver;
use domains::{
    DisplayNameLookup, DomainError, GeoPoint, Identity, ReviewStore, Site, SiteId, SiteStore,
    UserId, Visibility,
};
use services::consistency::round2;
use services::reviews::{SubmitOutcome, SubmitReview};
use services::{
    geohash, OriginHasher, ReviewPolicy, ReviewService, SearchLimits, SearchService, SiteService,
};
use storage_adapters::{InMemoryDirectory, InMemoryStore};

pub const ORIGIN_SALT: &str = "integration-salt";
pub const JWT_SECRET: &str = "integration-jwt-secret";
/// The only peer whose `X-Forwarded-For` header the test router believes.
pub const TRUSTED_PROXY: [u8; 4] = [10, 0, 0, 2];

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub origins: OriginHasher,
    pub sites: Arc<SiteService>,
    pub search: Arc<SearchService>,
    pub reviews: Arc<ReviewService>,
    pub auth: Arc<JwtIdentityResolver>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        Self::build(directory.clone(), directory)
    }

    /// Same wiring, but author display lookups go to `lookup`.
    pub fn with_lookup(lookup: Arc<dyn DisplayNameLookup>) -> Self {
        Self::build(Arc::new(InMemoryDirectory::new()), lookup)
    }

    fn build(directory: Arc<InMemoryDirectory>, lookup: Arc<dyn DisplayNameLookup>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let origins = OriginHasher::new(SecretString::from(ORIGIN_SALT.to_string()));
        Self {
            sites: Arc::new(SiteService::new(store.clone())),
            search: Arc::new(SearchService::new(store.clone(), SearchLimits::default())),
            reviews: Arc::new(ReviewService::new(
                store.clone(),
                store.clone(),
                lookup,
                origins.clone(),
                ReviewPolicy::default(),
            )),
            auth: Arc::new(JwtIdentityResolver::new(&SecretString::from(
                JWT_SECRET.to_string(),
            ))),
            store,
            directory,
            origins,
        }
    }

    pub async fn insert(&self, site: Site) -> Site {
        self.store
            .insert_site(site.clone())
            .await
            .expect("insert site");
        site
    }

    pub async fn stored_site(&self, id: SiteId) -> Site {
        self.store
            .get_site(id)
            .await
            .expect("store available")
            .expect("site exists")
    }

    pub async fn anon_submit(
        &self,
        site_id: SiteId,
        rating: i64,
        origin: &str,
    ) -> Result<SubmitOutcome, DomainError> {
        self.reviews
            .submit(SubmitReview {
                site_id,
                rating,
                comment: None,
                requester: None,
                origin: origin.to_string(),
            })
            .await
    }

    pub async fn submit_as(
        &self,
        site_id: SiteId,
        user: &Identity,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<SubmitOutcome, DomainError> {
        self.reviews
            .submit(SubmitReview {
                site_id,
                rating,
                comment: comment.map(str::to_string),
                requester: Some(user.clone()),
                origin: "10.0.0.1".to_string(),
            })
            .await
    }

    /// Asserts the stored site's aggregate matches its non-hidden reviews.
    pub async fn assert_consistent(&self, site_id: SiteId) {
        let site = self.stored_site(site_id).await;
        let visible: Vec<i64> = self
            .store
            .reviews_for_site(site_id)
            .await
            .expect("store available")
            .into_iter()
            .filter(|r| !r.hidden)
            .map(|r| i64::from(r.rating.value()))
            .collect();

        assert_eq!(site.review_count as usize, visible.len(), "review count");
        let expected = if visible.is_empty() {
            None
        } else {
            Some(round2(visible.iter().sum::<i64>() as f64 / visible.len() as f64))
        };
        assert_eq!(site.average_rating, expected, "average rating");
    }

    pub fn token(&self, user: &str) -> String {
        self.token_for(&Identity::new(user))
    }

    pub fn token_for(&self, identity: &Identity) -> String {
        self.auth
            .issue(identity, Duration::hours(1))
            .expect("issue token")
    }

    #[cfg(feature = "web-axum")]
    pub fn app(&self) -> axum::Router {
        api_adapters::router(api_adapters::AppState {
            search: self.search.clone(),
            sites: self.sites.clone(),
            reviews: self.reviews.clone(),
            identity: self.auth.clone(),
            metrics: Arc::new(api_adapters::Metrics::new()),
            trusted_proxies: Arc::from([std::net::IpAddr::from(TRUSTED_PROXY)]),
        })
    }
}

pub fn user(id: &str) -> Identity {
    Identity::new(id)
}

/// A public site owned by `owner-1`, created now.
pub fn site(lat: f64, lng: f64, title: &str) -> Site {
    site_at(lat, lng, title, Utc::now())
}

pub fn site_at(lat: f64, lng: f64, title: &str, created_at: DateTime<Utc>) -> Site {
    let location = GeoPoint::new(lat, lng);
    Site {
        id: SiteId::new(),
        owner_id: UserId::new("owner-1"),
        location,
        geohash: geohash::encode(location).expect("valid coordinate"),
        visibility: Visibility::Public,
        title: title.to_string(),
        description: String::new(),
        average_rating: None,
        review_count: 0,
        has_photos: false,
        created_at,
        updated_at: created_at,
    }
}
