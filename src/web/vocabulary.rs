use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::web::AppState;

/// Serve the JSON for a static vocabulary (SDG goals, contributor roles,
/// and similar fixed lists shipped with the portal).
pub async fn vocabulary_json(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    // vocabulary ids map directly to filenames; anything else is not found
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state
        .settings()
        .vocab_dir
        .join(format!("{}.json", id.to_lowercase()));

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND.into_response()
        }
        Err(err) => {
            error!(?err, vocabulary = %id, "failed to read vocabulary file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
