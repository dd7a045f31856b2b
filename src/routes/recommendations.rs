use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{AppState, SizeParams};
use crate::{
    error::AppResult,
    models::CatalogItem,
    services::{normalize, recommendations::DEFAULT_RECOMMENDATIONS},
};

/// Handler for items similar to a seed item
pub async fn recommend(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    Query(params): Query<SizeParams>,
) -> AppResult<Json<Vec<CatalogItem>>> {
    let k = normalize::limit(params.size.as_deref(), DEFAULT_RECOMMENDATIONS);
    let items = state.recommendations.recommend(&item_id, k).await?;
    Ok(Json(items))
}
