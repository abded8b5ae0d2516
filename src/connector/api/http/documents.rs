use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;

use super::error::{ApiError, ApiResult};
use super::types::{ListParams, MessageResponse, SearchParams};
use super::ApiContext;
use crate::domain::{
    Document, DocumentPatch, ListQuery, NewDocument, SearchQuery, MAX_LIST_LIMIT,
    MAX_SEARCH_LIMIT,
};

pub(super) fn check_limit(limit: usize, max: usize) -> Result<(), ApiError> {
    if limit == 0 || limit > max {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}, got {}",
            max, limit
        )));
    }
    Ok(())
}

pub async fn create(
    State(ctx): State<Arc<ApiContext>>,
    Json(input): Json<NewDocument>,
) -> ApiResult<Document> {
    let document = ctx.coordinator.create_document(input).await?;
    Ok(Json(document.without_embedding()))
}

pub async fn list(
    State(ctx): State<Arc<ApiContext>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Document>> {
    check_limit(params.limit, MAX_LIST_LIMIT)?;

    let mut query = ListQuery::new()
        .with_skip(params.skip)
        .with_limit(params.limit);
    if let Some(category) = params.category {
        query = query.with_category(category);
    }

    let documents = ctx.coordinator.list_documents(&query).await?;
    Ok(Json(
        documents.into_iter().map(Document::without_embedding).collect(),
    ))
}

pub async fn search(
    State(ctx): State<Arc<ApiContext>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Vec<Document>> {
    check_limit(params.limit, MAX_SEARCH_LIMIT)?;
    if params.q.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required query parameter: q"));
    }

    let mut query = SearchQuery::new(params.q).with_limit(params.limit);
    if let Some(category) = params.category {
        query = query.with_category(category);
    }

    let documents = ctx.coordinator.search_documents(&query).await?;
    Ok(Json(
        documents.into_iter().map(Document::without_embedding).collect(),
    ))
}

pub async fn get(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    let document = ctx.coordinator.get_document(&id).await?;
    Ok(Json(document.without_embedding()))
}

pub async fn update(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
    Json(patch): Json<DocumentPatch>,
) -> ApiResult<Document> {
    let document = ctx.coordinator.update_document(&id, patch).await?;
    Ok(Json(document.without_embedding()))
}

pub async fn delete(
    State(ctx): State<Arc<ApiContext>>,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    ctx.coordinator.delete_document(&id).await?;
    Ok(Json(MessageResponse {
        message: "Document deleted successfully".to_string(),
    }))
}
