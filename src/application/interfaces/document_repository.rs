use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Document, DomainError, ListQuery};

/// Column-level changes applied by [`DocumentRepository::update`].
#[derive(Debug, Clone)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    /// Present whenever title or content changed.
    pub embedding: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

/// Row storage for documents and their embeddings.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, document: &Document) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, DomainError>;

    /// Newest first, ties broken by id.
    async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, DomainError>;

    /// Returns false when no row has the given id.
    async fn update(&self, id: &str, changes: &DocumentChanges) -> Result<bool, DomainError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, DomainError>;

    /// Documents ordered by ascending cosine distance to `embedding`.
    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<Document>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;

    async fn list_ids(&self) -> Result<Vec<String>, DomainError>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<(), DomainError> {
        self.count().await.map(|_| ())
    }

    /// Releases the backend connection. The next call reconnects.
    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
