use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use domains::{Site, SiteId, Visibility};
use services::sites::NewSite;

use crate::http::error::ApiError;
use crate::http::extract::{MaybeIdentity, RequireIdentity};
use crate::http::state::AppState;

/// Client-facing site shape. Owner and geohash stay server side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub id: SiteId,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub visibility: Visibility,
    pub average_rating: Option<f64>,
    pub review_count: u32,
    pub has_photos: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Site> for SiteView {
    fn from(site: Site) -> Self {
        Self {
            id: site.id,
            title: site.title,
            description: site.description,
            latitude: site.location.lat,
            longitude: site.location.lng,
            visibility: site.visibility,
            average_rating: site.average_rating,
            review_count: site.review_count,
            has_photos: site.has_photos,
            created_at: site.created_at,
            updated_at: site.updated_at,
        }
    }
}

/// `POST /api/sites`
pub async fn create_site(
    State(state): State<AppState>,
    RequireIdentity(owner): RequireIdentity,
    Json(input): Json<NewSite>,
) -> Result<(StatusCode, Json<SiteView>), ApiError> {
    let site = state.sites.create(&owner, input).await?;
    Ok((StatusCode::CREATED, Json(site.into())))
}

/// `GET /api/sites/{id}`
pub async fn get_site(
    State(state): State<AppState>,
    MaybeIdentity(requester): MaybeIdentity,
    Path(id): Path<SiteId>,
) -> Result<Json<SiteView>, ApiError> {
    let site = state.sites.get(id, requester.as_ref()).await?;
    Ok(Json(site.into()))
}
