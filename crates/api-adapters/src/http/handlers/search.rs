use axum::extract::{Query, State};
use axum::Json;

use services::search::{SearchFilters, SearchResponse};

use crate::http::error::ApiError;
use crate::http::state::AppState;

/// `GET /api/sites/search`
pub async fn search_sites(
    State(state): State<AppState>,
    Query(filters): Query<SearchFilters>,
) -> Result<Json<SearchResponse>, ApiError> {
    let result = state.search.search(filters).await;
    state.metrics.record_search(&result);
    Ok(Json(result?))
}
