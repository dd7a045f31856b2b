use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::CatalogStore,
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{BrowseService, RecommendationEngine, SearchService, TrendingAggregator},
};

pub mod genres;
pub mod movies;
pub mod recommendations;
pub mod trending;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub search: Arc<SearchService>,
    pub browse: Arc<BrowseService>,
    pub trending: Arc<TrendingAggregator>,
    pub recommendations: Arc<RecommendationEngine>,
}

/// `?size=` on list endpoints, parsed leniently
#[derive(Debug, Default, Deserialize)]
pub struct SizeParams {
    #[serde(default)]
    pub size: Option<String>,
}

/// Creates the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/movies/search", get(movies::search))
        .route("/movies/by-genre/:genre", get(movies::by_genre))
        .route("/movies/:id", get(movies::details))
        .route("/movies/:id/play", post(movies::play))
        .route("/genres", get(genres::list))
        .route("/trending", get(trending::popular))
        .route("/trending/week", get(trending::week))
        .route("/trending/all-time", get(trending::all_time))
        .route("/recommendations/:id", get(recommendations::recommend))
}

async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
