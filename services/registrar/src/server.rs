//! Registrar HTTP server

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::handlers::{self, AppState};
use crate::ServiceError;

pub fn create_router(state: Arc<AppState>) -> Router {
    let nest_path = format!("/{}", state.system_name);
    let api = Router::new()
        .route(
            "/register",
            post(handlers::register).put(handlers::register),
        )
        .route("/query", get(handlers::query_page).post(handlers::query))
        .route("/unregister/:id", delete(handlers::unregister))
        .route("/status", get(handlers::status))
        .route("/syslist", get(handlers::syslist))
        .with_state(state);
    Router::new().nest(&nest_path, api)
}

pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<(), ServiceError> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Registrar listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C signal"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    tracing::info!("Starting graceful shutdown...");
}
