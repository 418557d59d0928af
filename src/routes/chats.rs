use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::AppResult;
use crate::extractors::Viewer;
use crate::inbox::ConversationSummary;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/chats", get(inbox))
}

async fn inbox(
    State(state): State<AppState>,
    viewer: Viewer,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.inbox.list_inbox(viewer.id).await?))
}
