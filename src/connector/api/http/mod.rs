//! HTTP API over the document coordinator.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::Container;
use crate::application::{DocumentCoordinator, ReconcileMirrorUseCase};

pub mod documents;
pub mod error;
pub mod graph;
pub mod health;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use types::*;

/// Shared state handed to every handler.
pub struct ApiContext {
    pub coordinator: Arc<DocumentCoordinator>,
    pub reconcile: Arc<ReconcileMirrorUseCase>,
}

impl ApiContext {
    pub fn from_container(container: &Container) -> Self {
        Self {
            coordinator: container.coordinator(),
            reconcile: Arc::new(container.reconcile_use_case()),
        }
    }
}

pub fn router(ctx: Arc<ApiContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::ping))
        .route("/database/health", get(health::database))
        .route("/documents", post(documents::create).get(documents::list))
        .route("/documents/search", get(documents::search))
        .route(
            "/documents/{id}",
            get(documents::get)
                .put(documents::update)
                .delete(documents::delete),
        )
        .route("/graph/documents", post(graph::create_node))
        .route("/graph/documents/{id}", get(graph::get_node))
        .route("/graph/documents/{id}/related", get(graph::related))
        .route("/graph/relationships", post(graph::create_relationship))
        .route("/graph/search", get(graph::search))
        .route("/graph/reconcile", post(graph::reconcile))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

/// Serves until Ctrl-C, then closes both backend connections.
pub async fn serve(container: &Container, host: &str, port: u16) -> Result<()> {
    let app = router(Arc::new(ApiContext::from_container(container)));
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    info!("Shutting down");
    container.shutdown().await
}
