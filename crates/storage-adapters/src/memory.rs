//! # In-memory document store
//!
//! Implements `SiteStore` and `ReviewStore` over process memory.
//!
//! Isolation model:
//! - Each site has its own async mutex. A `MemoryTransaction` holds it from
//!   `begin` until commit or drop, so writers on one site run one at a time
//!   while other sites proceed in parallel.
//! - Writes are staged inside the transaction (reads see them) and applied
//!   under a single write lock at commit. Readers take the read lock, so they
//!   see either all of a commit or none of it.
//! - Dropping a transaction without committing discards its writes.
//! - Lock entries exist only for stored sites. A transaction on an unknown
//!   site sees no site and cannot commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use domains::{
    Aggregate, GeohashRange, RateLimitEntry, Review, ReviewId, ReviewStore, Site, SiteId,
    SiteStore, SiteTransaction, StoreError, Visibility,
};

#[derive(Default)]
struct Tables {
    sites: HashMap<SiteId, Site>,
    /// Geohash-ordered index: geohash -> sites stored under it.
    by_geohash: BTreeMap<String, BTreeSet<SiteId>>,
    reviews: HashMap<ReviewId, Review>,
    reviews_by_site: HashMap<SiteId, BTreeSet<ReviewId>>,
    /// Latest accepted anonymous submission per (hashed origin, site).
    rate_limits: HashMap<(String, SiteId), DateTime<Utc>>,
}

impl Tables {
    fn site_reviews(&self, site_id: SiteId) -> Vec<Review> {
        self.reviews_by_site
            .get(&site_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.reviews.get(id).cloned())
            .collect()
    }

    fn put_review(&mut self, review: Review) {
        self.reviews_by_site
            .entry(review.site_id)
            .or_default()
            .insert(review.id);
        self.reviews.insert(review.id, review);
    }

    fn record_rate_limit(&mut self, entry: RateLimitEntry) {
        self.rate_limits
            .entry((entry.origin, entry.site_id))
            .and_modify(|at| *at = (*at).max(entry.created_at))
            .or_insert(entry.created_at);
    }

    fn remove_review(&mut self, id: ReviewId) {
        if let Some(review) = self.reviews.remove(&id) {
            if let Some(ids) = self.reviews_by_site.get_mut(&review.site_id) {
                ids.remove(&id);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    site_locks: Arc<DashMap<SiteId, Arc<Mutex<()>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with `StoreError::Unavailable` until
    /// switched back. Used to exercise outage handling.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Records a ledger row outside any review write, e.g. to seed history.
    pub fn record_rate_limit(&self, entry: RateLimitEntry) {
        self.tables.write().record_rate_limit(entry);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SiteStore for InMemoryStore {
    async fn get_site(&self, id: SiteId) -> Result<Option<Site>, StoreError> {
        self.check()?;
        Ok(self.tables.read().sites.get(&id).cloned())
    }

    async fn insert_site(&self, site: Site) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.write();
        if let Some(previous) = tables.sites.get(&site.id).map(|s| s.geohash.clone()) {
            if let Some(ids) = tables.by_geohash.get_mut(&previous) {
                ids.remove(&site.id);
            }
        }
        tables
            .by_geohash
            .entry(site.geohash.clone())
            .or_default()
            .insert(site.id);
        tables.sites.insert(site.id, site);
        Ok(())
    }

    async fn sites_in_range(
        &self,
        range: &GeohashRange,
        visibility: Visibility,
    ) -> Result<Vec<Site>, StoreError> {
        self.check()?;
        if range.start >= range.end {
            return Ok(Vec::new());
        }
        let tables = self.tables.read();
        let sites: Vec<Site> = tables
            .by_geohash
            .range::<str, _>((
                Bound::Included(range.start.as_str()),
                Bound::Excluded(range.end.as_str()),
            ))
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| tables.sites.get(id))
            .filter(|site| site.visibility == visibility)
            .cloned()
            .collect();
        debug!(start = %range.start, end = %range.end, hits = sites.len(), "geohash range query");
        Ok(sites)
    }

    async fn sites_with_visibility(&self, visibility: Visibility) -> Result<Vec<Site>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .sites
            .values()
            .filter(|site| site.visibility == visibility)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, StoreError> {
        self.check()?;
        Ok(self.tables.read().reviews.get(&id).cloned())
    }

    async fn reviews_for_site(&self, site_id: SiteId) -> Result<Vec<Review>, StoreError> {
        self.check()?;
        Ok(self.tables.read().site_reviews(site_id))
    }

    async fn begin(&self, site_id: SiteId) -> Result<Box<dyn SiteTransaction>, StoreError> {
        self.check()?;
        let known = self.tables.read().sites.contains_key(&site_id);
        let lock = if known {
            Arc::clone(&self.site_locks.entry(site_id).or_default())
        } else {
            Arc::new(Mutex::new(()))
        };
        let guard = lock.lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            site_id,
            known,
            store: self.clone(),
            _guard: guard,
            staged_reviews: HashMap::new(),
            staged_limits: Vec::new(),
            staged_aggregate: None,
        }))
    }
}

pub struct MemoryTransaction {
    site_id: SiteId,
    /// Whether the site existed at `begin`.
    known: bool,
    store: InMemoryStore,
    _guard: OwnedMutexGuard<()>,
    /// `None` marks a deletion.
    staged_reviews: HashMap<ReviewId, Option<Review>>,
    staged_limits: Vec<RateLimitEntry>,
    staged_aggregate: Option<Aggregate>,
}

#[async_trait]
impl SiteTransaction for MemoryTransaction {
    fn site_id(&self) -> SiteId {
        self.site_id
    }

    async fn site(&mut self) -> Result<Option<Site>, StoreError> {
        self.store.check()?;
        if !self.known {
            return Ok(None);
        }
        let mut site = self.store.tables.read().sites.get(&self.site_id).cloned();
        if let (Some(site), Some(aggregate)) = (site.as_mut(), self.staged_aggregate) {
            site.average_rating = aggregate.average_rating;
            site.review_count = aggregate.review_count;
        }
        Ok(site)
    }

    async fn reviews(&mut self) -> Result<Vec<Review>, StoreError> {
        self.store.check()?;
        let mut reviews = self.store.tables.read().site_reviews(self.site_id);
        reviews.retain(|r| !self.staged_reviews.contains_key(&r.id));
        reviews.extend(self.staged_reviews.values().flatten().cloned());
        reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reviews)
    }

    async fn latest_rate_limit(
        &mut self,
        origin: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.check()?;
        let committed = self
            .store
            .tables
            .read()
            .rate_limits
            .get(&(origin.to_string(), self.site_id))
            .copied();
        let staged = self
            .staged_limits
            .iter()
            .filter(|e| e.origin == origin)
            .map(|e| e.created_at)
            .max();
        Ok(committed.max(staged))
    }

    fn put_review(&mut self, review: Review) {
        self.staged_reviews.insert(review.id, Some(review));
    }

    fn delete_review(&mut self, id: ReviewId) {
        self.staged_reviews.insert(id, None);
    }

    fn put_rate_limit(&mut self, entry: RateLimitEntry) {
        self.staged_limits.push(entry);
    }

    fn set_aggregate(&mut self, aggregate: Aggregate) {
        self.staged_aggregate = Some(aggregate);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.store.check()?;
        let this = *self;

        if this
            .staged_reviews
            .values()
            .flatten()
            .any(|r| r.site_id != this.site_id)
            || this.staged_limits.iter().any(|e| e.site_id != this.site_id)
        {
            return Err(StoreError::Aborted(format!(
                "write outside transaction scope {}",
                this.site_id
            )));
        }

        let mut tables = this.store.tables.write();
        if !this.known || !tables.sites.contains_key(&this.site_id) {
            return Err(StoreError::Aborted(format!("site {} no longer exists", this.site_id)));
        }

        for (id, staged) in this.staged_reviews {
            match staged {
                Some(review) => tables.put_review(review),
                None => tables.remove_review(id),
            }
        }
        for entry in this.staged_limits {
            tables.record_rate_limit(entry);
        }
        if let Some(aggregate) = this.staged_aggregate {
            if let Some(site) = tables.sites.get_mut(&this.site_id) {
                site.average_rating = aggregate.average_rating;
                site.review_count = aggregate.review_count;
            }
        }
        Ok(())
    }
}
