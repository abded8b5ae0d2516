use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::GraphRepository;
use crate::domain::{
    current_timestamp, DocumentMetadata, DocumentNode, DomainError, MetadataFilter,
    RelatedDocument, Relationship,
};

type EdgeKey = (String, String, String);

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, DocumentNode>,
    edges: BTreeMap<EdgeKey, Relationship>,
}

/// Graph mirror held in process memory, used with `--memory-storage` and in tests.
pub struct InMemoryGraphRepository {
    state: Arc<Mutex<GraphState>>,
}

impl InMemoryGraphRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GraphState::default())),
        }
    }
}

impl Default for InMemoryGraphRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    async fn upsert_document_node(
        &self,
        id: &str,
        title: &str,
        metadata: &DocumentMetadata,
    ) -> Result<bool, DomainError> {
        let now = current_timestamp();
        let mut state = self.state.lock().await;

        let created_at = state.nodes.get(id).map_or(now, |node| node.created_at);
        state.nodes.insert(
            id.to_string(),
            DocumentNode {
                id: id.to_string(),
                title: title.to_string(),
                metadata: metadata.clone(),
                created_at,
                updated_at: now,
            },
        );
        Ok(true)
    }

    async fn upsert_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        confidence: f64,
        metadata: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        if !state.nodes.contains_key(source_id) || !state.nodes.contains_key(target_id) {
            debug!(
                "Skipping edge {} -[{}]-> {}: endpoint node missing",
                source_id, rel_type, target_id
            );
            return Ok(false);
        }

        let key = (
            source_id.to_string(),
            target_id.to_string(),
            rel_type.to_string(),
        );
        let metadata = metadata.cloned().unwrap_or_default();
        match state.edges.get_mut(&key) {
            Some(edge) => {
                edge.confidence = confidence;
                edge.metadata = metadata;
            }
            None => {
                state.edges.insert(
                    key,
                    Relationship {
                        source_id: source_id.to_string(),
                        target_id: target_id.to_string(),
                        rel_type: rel_type.to_string(),
                        confidence,
                        metadata,
                        created_at: current_timestamp(),
                    },
                );
            }
        }
        Ok(true)
    }

    async fn get_document_node(&self, id: &str) -> Result<Option<DocumentNode>, DomainError> {
        let state = self.state.lock().await;
        Ok(state.nodes.get(id).cloned())
    }

    async fn get_related_documents(
        &self,
        id: &str,
        rel_type: Option<&str>,
    ) -> Result<Vec<RelatedDocument>, DomainError> {
        let state = self.state.lock().await;
        let mut related: Vec<RelatedDocument> = state
            .edges
            .values()
            .filter(|edge| edge.source_id == id)
            .filter(|edge| rel_type.map_or(true, |t| edge.rel_type == t))
            .filter_map(|edge| {
                state.nodes.get(&edge.target_id).map(|node| RelatedDocument {
                    node: node.clone(),
                    relationship: edge.clone(),
                })
            })
            .collect();

        related.sort_by(|a, b| {
            b.relationship
                .confidence
                .partial_cmp(&a.relationship.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.id.cmp(&b.node.id))
                .then_with(|| a.relationship.rel_type.cmp(&b.relationship.rel_type))
        });
        Ok(related)
    }

    async fn search_by_metadata(
        &self,
        filters: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<DocumentNode>, DomainError> {
        let state = self.state.lock().await;
        let mut nodes: Vec<&DocumentNode> =
            state.nodes.values().filter(|node| node.matches(filters)).collect();
        nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(nodes.into_iter().take(limit).cloned().collect())
    }

    async fn delete_document_node(&self, id: &str) -> Result<bool, DomainError> {
        let mut state = self.state.lock().await;
        let before = state.edges.len();
        state
            .edges
            .retain(|_, edge| edge.source_id != id && edge.target_id != id);
        let detached = before - state.edges.len();

        let removed = state.nodes.remove(id).is_some();
        debug!("Detach-deleted node {} ({} edges)", id, detached);
        Ok(removed)
    }

    async fn list_node_ids(&self) -> Result<Vec<String>, DomainError> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state.nodes.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
