//! /geoip — continent lookup for the requesting client.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use beacon_registry::geoip::canonical_ip;

use super::ApiState;

#[derive(Serialize)]
pub struct GeoipResponse {
    /// null when the lookup has no answer.
    pub continent: Option<String>,
}

pub async fn handle_geoip(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let continent = state.geoip.continent_code_for(canonical_ip(peer.ip()));

    // A client's continent does not move; let it cache for a week,
    // privately since the answer is per-client.
    (
        [(header::CACHE_CONTROL, "private, max-age=604800")],
        Json(GeoipResponse { continent }),
    )
}
