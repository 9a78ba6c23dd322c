//! /announce — the front door for game servers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Form, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::ApiState;

/// Announces arrive as a single form or query field named `json`.
#[derive(Deserialize)]
pub struct AnnouncePayload {
    json: String,
}

pub async fn handle_announce(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Form(payload): Form<AnnouncePayload>,
) -> (StatusCode, String) {
    respond(&state, peer, &payload.json)
}

/// Legacy clients announce via GET with the payload in the query string.
pub async fn handle_announce_query(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(payload): Query<AnnouncePayload>,
) -> (StatusCode, String) {
    respond(&state, peer, &payload.json)
}

fn respond(state: &ApiState, peer: SocketAddr, raw: &str) -> (StatusCode, String) {
    let outcome = state.announces.submit(peer.ip(), raw);
    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, outcome.body)
}
