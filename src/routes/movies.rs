use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{BucketId, CatalogItem, SearchParams, SearchResult},
    services::normalize,
};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub item_id: String,
    pub bucket: BucketId,
    pub plays: u64,
}

/// Handler for hybrid catalog search
pub async fn search(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResult>> {
    let request = normalize::search_request(&params);
    tracing::info!(
        request_id = %request_id,
        query = request.text().unwrap_or(""),
        semantic = request.semantic,
        filters = request.filters.len(),
        page = request.pagination.page(),
        "Searching catalog"
    );

    let result = state.search.search(&request).await?;
    Ok(Json(result))
}

/// Handler for a single catalog record
pub async fn details(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Json<CatalogItem>> {
    let item = state
        .catalog
        .get_by_id(&item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", item_id)))?;
    Ok(Json(item))
}

/// Handler for one page of a genre
pub async fn by_genre(
    State(state): State<AppState>,
    Path(genre): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<SearchResult>> {
    let pagination = normalize::pagination(params.page.as_deref(), params.size.as_deref());
    let result = state.browse.by_genre(&genre, pagination).await?;
    Ok(Json(result))
}

/// Handler recording one playback of an item in the current week
pub async fn play(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(item_id): Path<String>,
) -> AppResult<Json<PlayResponse>> {
    if state.catalog.get_by_id(&item_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Movie {} not found", item_id)));
    }

    let bucket = BucketId::current();
    let plays = state.trending.record_play(&item_id, &bucket).await?;
    tracing::debug!(request_id = %request_id, item_id = %item_id, plays, "Play recorded");

    Ok(Json(PlayResponse {
        item_id,
        bucket,
        plays,
    }))
}
