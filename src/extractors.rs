use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::models::UserId;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated user making the request.
///
/// Credentials are checked upstream; the gateway forwards the resulting user
/// id in the configured header. Returns 401 if it is missing or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = state.config.auth.viewer_header.as_str();
        let raw = parts.headers.get(header).and_then(|v| v.to_str().ok());

        parse_viewer_id(raw)
            .map(|id| Viewer { id })
            .ok_or(AppError::Unauthorized)
    }
}

fn parse_viewer_id(raw: Option<&str>) -> Option<UserId> {
    raw?.trim().parse::<UserId>().ok().filter(|id| *id > 0)
}
