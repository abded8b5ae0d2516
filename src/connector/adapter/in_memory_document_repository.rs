use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{DocumentChanges, DocumentRepository};
use crate::domain::{Document, DomainError, ListQuery};

pub struct InMemoryDocumentRepository {
    documents: Arc<Mutex<HashMap<String, Document>>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryDocumentRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(a: &Document, b: &Document) -> std::cmp::Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| a.id().cmp(b.id()))
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, document: &Document) -> Result<(), DomainError> {
        let mut store = self.documents.lock().await;
        if store.contains_key(document.id()) {
            return Err(DomainError::storage(format!(
                "Document already exists: {}",
                document.id()
            )));
        }
        store.insert(document.id().to_string(), document.clone());
        debug!("Saved document {} to memory", document.id());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, DomainError> {
        let store = self.documents.lock().await;
        Ok(store.get(id).cloned())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Document>, DomainError> {
        let store = self.documents.lock().await;
        let mut documents: Vec<&Document> = store
            .values()
            .filter(|doc| query.category().map_or(true, |c| doc.category() == c))
            .collect();
        documents.sort_by(|a, b| newest_first(a, b));

        Ok(documents
            .into_iter()
            .skip(query.skip())
            .take(query.limit())
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, changes: &DocumentChanges) -> Result<bool, DomainError> {
        let mut store = self.documents.lock().await;
        let Some(current) = store.get(id) else {
            return Ok(false);
        };

        let updated = Document::reconstitute(
            current.id().to_string(),
            changes
                .title
                .clone()
                .unwrap_or_else(|| current.title().to_string()),
            changes
                .content
                .clone()
                .unwrap_or_else(|| current.content().to_string()),
            changes
                .tags
                .clone()
                .unwrap_or_else(|| current.tags().to_vec()),
            changes
                .category
                .clone()
                .unwrap_or_else(|| current.category().to_string()),
            changes
                .embedding
                .clone()
                .unwrap_or_else(|| current.embedding().to_vec()),
            current.created_at(),
            changes.updated_at,
        );
        store.insert(id.to_string(), updated);
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        let mut store = self.documents.lock().await;
        Ok(store.remove(id).is_some())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<Document>, DomainError> {
        let store = self.documents.lock().await;
        let mut scored: Vec<(f32, &Document)> = store
            .values()
            .filter(|doc| category.map_or(true, |c| doc.category() == c))
            .map(|doc| (cosine_distance(embedding, doc.embedding()), doc))
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id().cmp(b.1.id()))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let store = self.documents.lock().await;
        Ok(store.len() as u64)
    }

    async fn list_ids(&self) -> Result<Vec<String>, DomainError> {
        let store = self.documents.lock().await;
        let mut ids: Vec<String> = store.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// `1 - cosine similarity`; mismatched or zero vectors sit at the far end.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 2.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot_product / (norm_a * norm_b)
}
