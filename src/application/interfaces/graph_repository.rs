use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{DocumentMetadata, DocumentNode, DomainError, MetadataFilter, RelatedDocument};

/// Node and edge storage for document relationships.
///
/// The store does not check that relationship endpoints exist as documents;
/// callers are expected to validate ids against the vector store first.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Merge a document node keyed on `id`. `created_at` survives later merges.
    async fn upsert_document_node(
        &self,
        id: &str,
        title: &str,
        metadata: &DocumentMetadata,
    ) -> Result<bool, DomainError>;

    /// Merge the edge `(source)-[rel_type]->(target)`.
    ///
    /// Returns false without writing when either endpoint node is missing.
    async fn upsert_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        rel_type: &str,
        confidence: f64,
        metadata: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<bool, DomainError>;

    async fn get_document_node(&self, id: &str) -> Result<Option<DocumentNode>, DomainError>;

    /// Outgoing edges of `id`, one hop, optionally restricted to one type.
    async fn get_related_documents(
        &self,
        id: &str,
        rel_type: Option<&str>,
    ) -> Result<Vec<RelatedDocument>, DomainError>;

    async fn search_by_metadata(
        &self,
        filters: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<DocumentNode>, DomainError>;

    /// Remove the node together with every incident edge.
    async fn delete_document_node(&self, id: &str) -> Result<bool, DomainError>;

    async fn list_node_ids(&self) -> Result<Vec<String>, DomainError>;

    async fn ping(&self) -> Result<(), DomainError> {
        self.list_node_ids().await.map(|_| ())
    }

    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
