use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DocumentMetadata, DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    pub category: Option<String>,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct RelatedParams {
    pub rel_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileParams {
    #[serde(default)]
    pub repair: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipRequest {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseHealthResponse {
    pub success: bool,
    pub message: String,
    pub vector_store_status: String,
    pub graph_store_status: String,
    pub mirror_policy: String,
    pub mirror_writes: u64,
    pub mirror_failures: u64,
}
