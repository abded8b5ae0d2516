use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::{GraphRepository, RelatedEnricher};
use crate::domain::{
    Document, DocumentMetadata, DocumentNode, DocumentPatch, DomainError, ListQuery,
    MetadataFilter, MirrorPolicy, MirrorStats, NewDocument, RelatedSummary, RelationshipType,
    SearchQuery, UpdateOutcome,
};

use super::{MirrorOnlyEnricher, VectorStore};

/// Reachability of both backends.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub vector_store: String,
    pub graph_store: String,
}

impl BackendStatus {
    pub fn is_healthy(&self) -> bool {
        self.vector_store == "connected" && self.graph_store == "connected"
    }
}

#[derive(Debug, Default)]
struct MirrorCounters {
    writes: AtomicU64,
    failures: AtomicU64,
}

/// Orchestrates writes across the vector store and the graph mirror, and
/// federates reads over both.
///
/// The vector store is always written first and is authoritative. The graph
/// half of a dual write is governed by the configured [`MirrorPolicy`].
pub struct DocumentCoordinator {
    vector_store: Arc<VectorStore>,
    graph: Arc<dyn GraphRepository>,
    enricher: Arc<dyn RelatedEnricher>,
    policy: MirrorPolicy,
    counters: MirrorCounters,
}

impl DocumentCoordinator {
    pub fn new(vector_store: Arc<VectorStore>, graph: Arc<dyn GraphRepository>) -> Self {
        Self {
            vector_store,
            graph,
            enricher: Arc::new(MirrorOnlyEnricher),
            policy: MirrorPolicy::default(),
            counters: MirrorCounters::default(),
        }
    }

    pub fn with_policy(mut self, policy: MirrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn RelatedEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn policy(&self) -> MirrorPolicy {
        self.policy
    }

    pub async fn create_document(&self, input: NewDocument) -> Result<Document, DomainError> {
        let id = self.vector_store.create(&input).await?;

        let mirrored = self
            .graph
            .upsert_document_node(&id, &input.title, &input.metadata)
            .await;
        self.settle_mirror("create", &id, mirrored)?;

        self.vector_store
            .get(&id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Document not found: {}", id)))
    }

    pub async fn get_document(&self, id: &str) -> Result<Document, DomainError> {
        self.vector_store
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Document not found: {}", id)))
    }

    pub async fn list_documents(&self, query: &ListQuery) -> Result<Vec<Document>, DomainError> {
        self.vector_store.list(query).await
    }

    pub async fn search_documents(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<Document>, DomainError> {
        self.vector_store.search(query).await
    }

    /// Content fields go to the vector store, metadata only to the graph.
    /// A title change is pushed to the mirror as well since the node carries it.
    pub async fn update_document(
        &self,
        id: &str,
        patch: DocumentPatch,
    ) -> Result<Document, DomainError> {
        if patch.is_empty() {
            return Err(DomainError::validation("No fields to update"));
        }
        patch.validate()?;

        if patch.touches_content_fields() {
            if self.vector_store.update(id, &patch).await? == UpdateOutcome::NotFound {
                return Err(DomainError::not_found(format!("Document not found: {}", id)));
            }
        }

        let document = self.get_document(id).await?;

        if patch.touches_mirror() {
            let mirrored = self.refresh_mirror(&document, patch.metadata).await;
            self.settle_mirror("update", id, mirrored)?;
        }

        Ok(document)
    }

    pub async fn delete_document(&self, id: &str) -> Result<bool, DomainError> {
        if self.vector_store.get(id).await?.is_none() {
            return Err(DomainError::not_found(format!("Document not found: {}", id)));
        }

        let removed = self.vector_store.delete(id).await?;
        info!("Document deleted: {}", id);

        // An absent node is already the desired end state.
        let detached = self.graph.delete_document_node(id).await.map(|_| true);
        self.settle_mirror("delete", id, detached)?;

        Ok(removed)
    }

    pub async fn create_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        confidence: f64,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<bool, DomainError> {
        let rel_type = RelationshipType::parse(rel_type)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::validation(format!(
                "Confidence must be between 0.0 and 1.0, got {}",
                confidence
            )));
        }

        if self.vector_store.get(source_id).await?.is_none() {
            return Err(DomainError::not_found(format!(
                "Source document not found: {}",
                source_id
            )));
        }
        if self.vector_store.get(target_id).await?.is_none() {
            return Err(DomainError::not_found(format!(
                "Target document not found: {}",
                target_id
            )));
        }

        let created = self
            .graph
            .upsert_relationship(
                source_id,
                target_id,
                rel_type.as_str(),
                confidence,
                metadata.as_ref(),
            )
            .await?;

        if created {
            info!(
                "Relationship {} -[{}]-> {} (confidence {:.2})",
                source_id, rel_type, target_id, confidence
            );
        } else {
            warn!(
                "Relationship {} -[{}]-> {} not written: endpoint missing from graph mirror; \
                 run reconciliation to repair",
                source_id, rel_type, target_id
            );
        }

        Ok(created)
    }

    pub async fn get_related_documents(
        &self,
        id: &str,
        rel_type: Option<&str>,
    ) -> Result<Vec<RelatedSummary>, DomainError> {
        let rel_type = rel_type.map(RelationshipType::parse).transpose()?;
        let related = self
            .graph
            .get_related_documents(id, rel_type.as_ref().map(|t| t.as_str()))
            .await?;

        debug!(
            "{} related documents for {} (enricher: {})",
            related.len(),
            id,
            self.enricher.name()
        );
        self.enricher.enrich(related).await
    }

    pub async fn get_document_node(&self, id: &str) -> Result<DocumentNode, DomainError> {
        self.graph
            .get_document_node(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Document node not found: {}", id)))
    }

    /// Graph-native node write, errors propagate.
    pub async fn upsert_document_node(
        &self,
        id: &str,
        title: &str,
        metadata: &DocumentMetadata,
    ) -> Result<bool, DomainError> {
        if title.trim().is_empty() {
            return Err(DomainError::validation("Missing required field: title"));
        }
        self.graph.upsert_document_node(id, title, metadata).await
    }

    pub async fn search_by_metadata(
        &self,
        filters: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<DocumentNode>, DomainError> {
        if limit == 0 {
            return Err(DomainError::validation("limit must be at least 1"));
        }
        self.graph.search_by_metadata(filters, limit).await
    }

    pub async fn graph_node_count(&self) -> Result<usize, DomainError> {
        Ok(self.graph.list_node_ids().await?.len())
    }

    pub fn mirror_stats(&self) -> MirrorStats {
        MirrorStats {
            mirror_writes: self.counters.writes.load(Ordering::Relaxed),
            mirror_failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub async fn check_backends(&self) -> BackendStatus {
        BackendStatus {
            vector_store: describe(self.vector_store.ping().await),
            graph_store: describe(self.graph.ping().await),
        }
    }

    pub async fn shutdown(&self) -> Result<(), DomainError> {
        self.vector_store.close().await?;
        self.graph.close().await?;
        info!("Backend connections closed");
        Ok(())
    }

    async fn refresh_mirror(
        &self,
        document: &Document,
        metadata: Option<DocumentMetadata>,
    ) -> Result<bool, DomainError> {
        let metadata = match metadata {
            Some(metadata) => metadata,
            None => self
                .graph
                .get_document_node(document.id())
                .await?
                .map(|node| node.metadata)
                .unwrap_or_default(),
        };

        self.graph
            .upsert_document_node(document.id(), document.title(), &metadata)
            .await
    }

    /// Applies the mirror policy to the outcome of a graph-side dual write.
    fn settle_mirror(
        &self,
        operation: &str,
        id: &str,
        outcome: Result<bool, DomainError>,
    ) -> Result<(), DomainError> {
        let reason = match outcome {
            Ok(true) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!("Graph mirror {} succeeded for {}", operation, id);
                return Ok(());
            }
            Ok(false) => "graph store reported no write".to_string(),
            Err(e) => e.to_string(),
        };

        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        let error = DomainError::mirror(format!(
            "graph {} for document {} failed: {}",
            operation, id, reason
        ));

        match self.policy {
            MirrorPolicy::FailOpen => {
                warn!("{} (policy {}, continuing)", error, self.policy);
                Ok(())
            }
            MirrorPolicy::FailClosed => {
                warn!("{} (policy {})", error, self.policy);
                Err(error)
            }
        }
    }
}

fn describe(result: Result<(), DomainError>) -> String {
    match result {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    }
}
