use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::application::{DocumentChanges, DocumentRepository, EmbeddingService};
use crate::domain::{
    current_timestamp, embedding_text, Document, DocumentPatch, DomainError, ListQuery,
    NewDocument, SearchQuery, UpdateOutcome, EMBEDDING_DIMENSIONS,
};

/// Content-side store: validation, id generation and embedding on top of a
/// [`DocumentRepository`] backend. This is the source of truth for documents.
pub struct VectorStore {
    repository: Arc<dyn DocumentRepository>,
    embedding_service: Arc<dyn EmbeddingService>,
}

impl VectorStore {
    /// Fails when the embedding provider does not produce 384-d vectors.
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        embedding_service: Arc<dyn EmbeddingService>,
    ) -> Result<Self, DomainError> {
        let dimensions = embedding_service.config().dimensions();
        if dimensions != EMBEDDING_DIMENSIONS {
            return Err(DomainError::internal(format!(
                "Embedding model {} produces {} dimensions, the store requires {}",
                embedding_service.config().model_name(),
                dimensions,
                EMBEDDING_DIMENSIONS
            )));
        }

        Ok(Self {
            repository,
            embedding_service,
        })
    }

    pub async fn create(&self, input: &NewDocument) -> Result<String, DomainError> {
        input.validate()?;

        let embedding = self
            .embed(&embedding_text(&input.title, &input.content))
            .await?;
        let document = Document::new(
            input.title.clone(),
            input.content.clone(),
            input.tags.clone(),
            input.category.clone(),
            embedding,
        );

        self.repository.insert(&document).await?;
        info!("Document created: {} ({})", document.id(), document.title());

        Ok(document.id().to_string())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, DomainError> {
        self.repository.find_by_id(id).await
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, DomainError> {
        self.repository.list(query).await
    }

    /// Applies the content fields of `patch`. Metadata is ignored here; it
    /// belongs to the graph store.
    pub async fn update(
        &self,
        id: &str,
        patch: &DocumentPatch,
    ) -> Result<UpdateOutcome, DomainError> {
        patch.validate()?;

        let existing = match self.repository.find_by_id(id).await? {
            Some(doc) => doc,
            None => return Ok(UpdateOutcome::NotFound),
        };

        if !patch.touches_content_fields() {
            return Ok(UpdateOutcome::Unchanged);
        }

        let embedding = if patch.requires_reembedding() {
            let title = patch.title.as_deref().unwrap_or(existing.title());
            let content = patch.content.as_deref().unwrap_or(existing.content());
            Some(self.embed(&embedding_text(title, content)).await?)
        } else {
            None
        };

        let changes = DocumentChanges {
            title: patch.title.clone(),
            content: patch.content.clone(),
            tags: patch.tags.clone(),
            category: patch.category.clone(),
            embedding,
            updated_at: current_timestamp(),
        };

        if self.repository.update(id, &changes).await? {
            debug!("Document updated: {}", id);
            Ok(UpdateOutcome::Updated)
        } else {
            // Deleted between the read and the write.
            Ok(UpdateOutcome::NotFound)
        }
    }

    pub async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        self.repository.delete(id).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Document>, DomainError> {
        let start_time = Instant::now();

        let query_embedding = self.embed(query.query()).await?;
        let results = self
            .repository
            .nearest(&query_embedding, query.limit(), query.category())
            .await?;

        info!(
            "Search '{}' returned {} documents in {:.3}s",
            query.query(),
            results.len(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(results)
    }

    pub async fn count(&self) -> Result<u64, DomainError> {
        self.repository.count().await
    }

    pub async fn list_ids(&self) -> Result<Vec<String>, DomainError> {
        self.repository.list_ids().await
    }

    pub async fn ping(&self) -> Result<(), DomainError> {
        self.repository.ping().await
    }

    pub async fn close(&self) -> Result<(), DomainError> {
        self.repository.close().await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let vector = self.embedding_service.embed(text).await?;
        if vector.len() != EMBEDDING_DIMENSIONS {
            return Err(DomainError::embedding(format!(
                "Expected embedding dimension {}, got {}",
                EMBEDDING_DIMENSIONS,
                vector.len()
            )));
        }
        Ok(vector)
    }
}
