//! Site creation and visibility-checked reads.
//!
//! Update and delete of site records live outside this subsystem; creation is
//! here because the geohash key is fixed at that moment.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use domains::{DomainError, GeoPoint, Identity, Site, SiteId, SiteStore, Visibility};

use crate::geohash;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    pub latitude: f64,
    pub longitude: f64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub has_photos: bool,
}

pub struct SiteService {
    sites: Arc<dyn SiteStore>,
}

impl SiteService {
    pub fn new(sites: Arc<dyn SiteStore>) -> Self {
        Self { sites }
    }

    pub async fn create(&self, owner: &Identity, input: NewSite) -> Result<Site, DomainError> {
        let location = GeoPoint::new(input.latitude, input.longitude).validated()?;
        let now = Utc::now();
        let site = Site {
            id: SiteId::new(),
            owner_id: owner.user_id.clone(),
            location,
            geohash: geohash::encode(location)?,
            visibility: input.visibility,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            average_rating: None,
            review_count: 0,
            has_photos: input.has_photos,
            created_at: now,
            updated_at: now,
        };

        self.sites
            .insert_site(site.clone())
            .await
            .map_err(|e| e.into_store())?;
        info!(site_id = %site.id, geohash = %site.geohash, "site created");
        Ok(site)
    }

    /// Private sites are only visible to their owner; anyone else gets
    /// `SiteNotFound` so existence is not leaked.
    pub async fn get(&self, id: SiteId, requester: Option<&Identity>) -> Result<Site, DomainError> {
        let site = self
            .sites
            .get_site(id)
            .await
            .map_err(|e| e.into_store())?
            .ok_or(DomainError::SiteNotFound(id))?;

        let is_owner = requester.is_some_and(|r| r.user_id == site.owner_id);
        match site.visibility {
            Visibility::Private if !is_owner => Err(DomainError::SiteNotFound(id)),
            _ => Ok(site),
        }
    }
}
