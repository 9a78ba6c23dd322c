//! /list and /server — the published snapshot and single-server lookups.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use super::ApiState;

/// The full published document, exactly as last regenerated. Short cache
/// lifetime: the list mutates with every committed announce.
pub async fn handle_list(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state.publisher.snapshot().to_string();
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "max-age=20"),
        ],
        body,
    )
}

/// One server's public projection, looked up by endpoint.
pub async fn handle_server(
    State(state): State<ApiState>,
    Path((address, port)): Path<(String, u16)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.store.find_for_announce(None, &address, port) {
        Some(record) if record.online => {
            Ok(Json(record.as_public_entry(state.clock.now_unix())))
        }
        _ => Err((StatusCode::NOT_FOUND, "Server not found".to_string())),
    }
}
