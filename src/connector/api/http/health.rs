use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use super::types::{DatabaseHealthResponse, HealthResponse};
use super::ApiContext;

pub async fn ping() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Always 200; the body says which backend is down.
pub async fn database(State(ctx): State<Arc<ApiContext>>) -> Json<DatabaseHealthResponse> {
    let status = ctx.coordinator.check_backends().await;
    let stats = ctx.coordinator.mirror_stats();
    let success = status.is_healthy();

    Json(DatabaseHealthResponse {
        success,
        message: if success {
            "Database connections checked".to_string()
        } else {
            "One or more database connections failed".to_string()
        },
        vector_store_status: status.vector_store,
        graph_store_status: status.graph_store,
        mirror_policy: ctx.coordinator.policy().to_string(),
        mirror_writes: stats.mirror_writes,
        mirror_failures: stats.mirror_failures,
    })
}
