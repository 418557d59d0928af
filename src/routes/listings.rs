use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::db::models::{ListingId, ListingImage};
use crate::error::AppResult;
use crate::search::{BrowseParams, ListingSummary, SearchParams};
use crate::state::AppState;

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/listings", get(browse))
        .route("/listings/search", get(search))
        .route("/listings/{id}", get(detail))
        .route("/listings/{id}/images", get(images))
}

// --- Handlers ---

async fn browse(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> AppResult<Json<Vec<ListingSummary>>> {
    let filter = params.into_filter(state.config.search.default_radius_km)?;
    let items = state.search.search(&filter).await?;
    Ok(Json(items))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<ListingSummary>>> {
    let filter = params.into_filter(state.config.search.default_radius_km)?;
    let items = state.search.search_mandatory(&filter).await?;
    Ok(Json(items))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> AppResult<Json<ListingSummary>> {
    Ok(Json(state.search.listing(id).await?))
}

async fn images(
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> AppResult<Json<Vec<ListingImage>>> {
    Ok(Json(state.search.listing_images(id).await?))
}
