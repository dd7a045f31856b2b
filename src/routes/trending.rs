use axum::{
    extract::{Query, State},
    Json,
};

use super::{AppState, SizeParams};
use crate::{
    error::AppResult,
    models::{CatalogItem, TrendingEntry},
    services::normalize,
};

const DEFAULT_TRENDING: usize = 10;

/// Handler for items ranked by view and rating signals
pub async fn popular(
    State(state): State<AppState>,
    Query(params): Query<SizeParams>,
) -> AppResult<Json<Vec<CatalogItem>>> {
    let size = normalize::limit(params.size.as_deref(), DEFAULT_TRENDING);
    Ok(Json(state.browse.popular(size).await?))
}

/// Handler for the most played items this week
pub async fn week(
    State(state): State<AppState>,
    Query(params): Query<SizeParams>,
) -> AppResult<Json<Vec<TrendingEntry>>> {
    let k = normalize::limit(params.size.as_deref(), DEFAULT_TRENDING);
    Ok(Json(state.trending.top_current_period(k).await?))
}

/// Handler for the most played items over all weeks
pub async fn all_time(
    State(state): State<AppState>,
    Query(params): Query<SizeParams>,
) -> AppResult<Json<Vec<TrendingEntry>>> {
    let k = normalize::limit(params.size.as_deref(), DEFAULT_TRENDING);
    Ok(Json(state.trending.top_all_time(k).await?))
}
