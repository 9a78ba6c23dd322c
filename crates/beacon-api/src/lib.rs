pub mod handlers;

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub async fn serve(state: ApiState, bind_address: &str, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(
            "/announce",
            get(handlers::handle_announce_query)
                .post(handlers::handle_announce)
                .layer(DefaultBodyLimit::max(64 * 1024)),
        )
        .route("/list", get(handlers::handle_list))
        .route("/server/{address}/{port}", get(handlers::handle_server))
        .route("/geoip", get(handlers::handle_geoip))
        .with_state(state)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("{bind_address}:{port}")).await?;
    tracing::info!(%bind_address, port, "API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
