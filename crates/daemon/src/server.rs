use std::net::SocketAddr;

use anyhow::Context as _;
use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any as CorsAny, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    api::{self, AppState},
    config::BridgeConfig,
};

#[axum::debug_handler]
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move {
        state.broker.add_client(socket).await;
    })
}

/// Router for the realtime feed; the socket lives at the root path.
pub fn ws_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .with_state(state)
}

/// Router for the HTTP surface: command endpoint, status, static assets.
pub fn http_router(state: AppState, static_dir: &str) -> Router {
    api::create_router(state, static_dir)
        .layer(
            CorsLayer::new()
                .allow_origin(CorsAny)
                .allow_methods(CorsAny)
                .allow_headers(CorsAny),
        )
        .layer(TraceLayer::new_for_http())
}

/// Binds and serves both listeners until the token is cancelled.
pub async fn run(
    state: AppState,
    config: BridgeConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let ws_addr = SocketAddr::from(([0, 0, 0, 0], config.ws_port));
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));

    let ws_listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("failed to bind websocket listener on {ws_addr}"))?;
    let http_listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {http_addr}"))?;

    tracing::info!("websocket feed listening on ws://{ws_addr}");
    tracing::info!("http server listening on http://{http_addr}");

    let ws_app = ws_router(state.clone());
    let http_app = http_router(state, &config.static_dir);

    let ws_shutdown = shutdown.clone();
    let (ws_result, http_result) = tokio::join!(
        async {
            axum::serve(ws_listener, ws_app)
                .with_graceful_shutdown(async move { ws_shutdown.cancelled().await })
                .await
        },
        async {
            axum::serve(http_listener, http_app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        },
    );
    ws_result.context("websocket server failed")?;
    http_result.context("http server failed")?;

    Ok(())
}
