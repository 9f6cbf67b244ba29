//! Router assembly and HTTP serving.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use restgate_common::{GatewayError, Result};

use crate::handlers::{meta, records, rpc, AppState};

/// Builds the full route table under the `/api` prefix.
///
/// Literal routes (`/tables`, `/rpc`, `/_policies`) take precedence over the
/// table-parameterized routes; within those, `count`/`describe`/`groupby`/
/// `aggregate` are reserved id values and `exists` a reserved child value.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/tables", get(meta::tables))
        .route("/health", get(meta::health))
        .route("/_policies/reload", post(meta::reload_policies))
        .route("/rpc/{name}", post(rpc::call_routine))
        .route(
            "/{table}",
            get(records::list)
                .post(records::create)
                .patch(records::patch)
                .delete(records::delete_bulk),
        )
        .route(
            "/{table}/{id}",
            get(records::read_dispatch)
                .put(records::update)
                .delete(records::delete_row),
        )
        .route("/{table}/{id}/{child}", get(records::child_dispatch));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router until ctrl-c.
pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Connection(format!("failed to bind {}: {}", addr, e)))?;

    info!(%addr, "Gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Internal(format!("server error: {}", e)))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
