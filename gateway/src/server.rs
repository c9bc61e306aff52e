//! HTTP surface: the WebSocket endpoint and a health check

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::service::RequestHandler;
use crate::session::{Connection, WsTransport};

/// Create the gateway application router
pub fn create_app(handler: Arc<dyn RequestHandler>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .layer(Extension(handler))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ws_upgrade(
    Extension(handler): Extension<Arc<dyn RequestHandler>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let id = Uuid::new_v4().to_string();
        let mut connection = Connection::new(id, WsTransport::new(socket), handler);
        connection.run().await;
    })
}

pub async fn serve(addr: SocketAddr, handler: Arc<dyn RequestHandler>) -> anyhow::Result<()> {
    let app = create_app(handler);

    info!("Starting gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
