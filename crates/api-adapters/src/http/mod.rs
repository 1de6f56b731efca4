//! axum router and the pieces it is assembled from.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

use handlers::{ops, reviews, search, sites};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(ops::health))
        .route("/metrics", get(ops::metrics))
        .route("/api/sites", post(sites::create_site))
        .route("/api/sites/search", get(search::search_sites))
        .route("/api/sites/{id}", get(sites::get_site))
        .route(
            "/api/sites/{id}/reviews",
            get(reviews::list_reviews).post(reviews::submit_review),
        )
        .route(
            "/api/reviews/{id}",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route("/api/reviews/{id}/flag", post(reviews::flag_review))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::cors_policy()),
        )
        .with_state(state)
}
