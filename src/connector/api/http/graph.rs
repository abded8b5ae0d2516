use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use super::documents::check_limit;
use super::error::{ApiError, ApiResult};
use super::types::{
    CreateNodeRequest, CreateRelationshipRequest, ReconcileParams, RelatedParams,
    SuccessResponse,
};
use super::ApiContext;
use crate::domain::{
    DocumentNode, DriftReport, MetadataFilter, RelatedSummary, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
};

pub async fn create_node(
    State(ctx): State<Arc<ApiContext>>,
    Json(request): Json<CreateNodeRequest>,
) -> ApiResult<SuccessResponse> {
    let success = ctx
        .coordinator
        .upsert_document_node(&request.id, &request.title, &request.metadata)
        .await?;
    if !success {
        return Err(ApiError::internal("Failed to create document node"));
    }
    Ok(Json(SuccessResponse { success }))
}

pub async fn create_relationship(
    State(ctx): State<Arc<ApiContext>>,
    Json(request): Json<CreateRelationshipRequest>,
) -> ApiResult<SuccessResponse> {
    let success = ctx
        .coordinator
        .create_relationship(
            &request.source_id,
            &request.target_id,
            &request.rel_type,
            request.confidence,
            request.metadata,
        )
        .await?;
    if !success {
        return Err(ApiError::internal(
            "Failed to create relationship: an endpoint is missing from the graph mirror",
        ));
    }
    Ok(Json(SuccessResponse { success }))
}

pub async fn get_node(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
) -> ApiResult<DocumentNode> {
    Ok(Json(ctx.coordinator.get_document_node(&id).await?))
}

pub async fn related(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
    Query(params): Query<RelatedParams>,
) -> ApiResult<Vec<RelatedSummary>> {
    let related = ctx
        .coordinator
        .get_related_documents(&id, params.rel_type.as_deref())
        .await?;
    Ok(Json(related))
}

/// Every query parameter except `limit` is an exact-match metadata filter.
pub async fn search(
    State(ctx): State<Arc<ApiContext>>,
    Query(mut params): Query<BTreeMap<String, String>>,
) -> ApiResult<Vec<DocumentNode>> {
    let limit = match params.remove("limit") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::bad_request(format!("Invalid limit: {}", raw)))?,
        None => DEFAULT_LIST_LIMIT,
    };
    check_limit(limit, MAX_LIST_LIMIT)?;
    let filters: MetadataFilter = params;

    let nodes = ctx.coordinator.search_by_metadata(&filters, limit).await?;
    Ok(Json(nodes))
}

pub async fn reconcile(
    State(ctx): State<Arc<ApiContext>>,
    Query(params): Query<ReconcileParams>,
) -> ApiResult<DriftReport> {
    Ok(Json(ctx.reconcile.execute(params.repair).await?))
}
