//! Review endpoints. Writes record a `review_writes` metric per operation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use domains::{DomainError, ReviewId, SiteId};
use services::reviews::{
    FlagOutcome, ListReviews, ReviewPage, ReviewView, SubmitOutcome, SubmitReview, UpdateReview,
    WriteOutcome,
};

use crate::http::error::ApiError;
use crate::http::extract::{ClientOrigin, MaybeIdentity, RequireIdentity};
use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    /// Kept as raw JSON so `4.5` or `"4"` surface as `invalid_rating`
    /// instead of a generic body rejection.
    #[serde(default)]
    pub rating: Value,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlagBody {
    #[serde(default)]
    pub reason: String,
}

fn integer_rating(value: &Value) -> Result<i64, DomainError> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e9 => Ok(f as i64),
        _ => Err(DomainError::InvalidRating),
    }
}

/// `GET /api/sites/{id}/reviews`
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(site_id): Path<SiteId>,
    Query(query): Query<ListReviews>,
) -> Result<Json<ReviewPage>, ApiError> {
    Ok(Json(state.reviews.list(site_id, query).await?))
}

/// `POST /api/sites/{id}/reviews`: 201 for a new review, 200 when an
/// identified author's existing review was replaced.
pub async fn submit_review(
    State(state): State<AppState>,
    MaybeIdentity(requester): MaybeIdentity,
    ClientOrigin(origin): ClientOrigin,
    Path(site_id): Path<SiteId>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitOutcome>), ApiError> {
    let result = match integer_rating(&body.rating) {
        Ok(rating) => {
            state
                .reviews
                .submit(SubmitReview {
                    site_id,
                    rating,
                    comment: body.comment,
                    requester,
                    origin,
                })
                .await
        }
        Err(e) => Err(e),
    };
    state.metrics.record_review_write("submit", &result);

    let outcome = result?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// `GET /api/reviews/{id}`
pub async fn get_review(
    State(state): State<AppState>,
    MaybeIdentity(requester): MaybeIdentity,
    Path(review_id): Path<ReviewId>,
) -> Result<Json<ReviewView>, ApiError> {
    Ok(Json(state.reviews.get(review_id, requester.as_ref()).await?))
}

/// `PATCH /api/reviews/{id}`
pub async fn update_review(
    State(state): State<AppState>,
    RequireIdentity(requester): RequireIdentity,
    Path(review_id): Path<ReviewId>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<WriteOutcome>, ApiError> {
    let result = match body.rating.as_ref().map(integer_rating).transpose() {
        Ok(rating) => {
            let changes = UpdateReview {
                rating,
                comment: body.comment,
            };
            state.reviews.update(review_id, &requester, changes).await
        }
        Err(e) => Err(e),
    };
    state.metrics.record_review_write("update", &result);
    Ok(Json(result?))
}

/// `DELETE /api/reviews/{id}`
pub async fn delete_review(
    State(state): State<AppState>,
    RequireIdentity(requester): RequireIdentity,
    Path(review_id): Path<ReviewId>,
) -> Result<Json<WriteOutcome>, ApiError> {
    let result = state.reviews.delete(review_id, &requester).await;
    state.metrics.record_review_write("delete", &result);
    Ok(Json(result?))
}

/// `POST /api/reviews/{id}/flag`
pub async fn flag_review(
    State(state): State<AppState>,
    RequireIdentity(flagger): RequireIdentity,
    Path(review_id): Path<ReviewId>,
    Json(body): Json<FlagBody>,
) -> Result<Json<FlagOutcome>, ApiError> {
    let result = state.reviews.flag(review_id, &flagger, &body.reason).await;
    state.metrics.record_review_write("flag", &result);
    Ok(Json(result?))
}
