use axum::{extract::State, Json};

use super::AppState;
use crate::error::AppResult;

/// Handler listing every genre in the catalog
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let genres = state.browse.genres().await?;
    Ok(Json(genres))
}
