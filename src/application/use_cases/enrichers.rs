use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::RelatedEnricher;
use crate::domain::{DomainError, RelatedDocument, RelatedSummary};

use super::VectorStore;

/// Returns the graph mirror as-is; no vector-store reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct MirrorOnlyEnricher;

#[async_trait]
impl RelatedEnricher for MirrorOnlyEnricher {
    async fn enrich(
        &self,
        related: Vec<RelatedDocument>,
    ) -> Result<Vec<RelatedSummary>, DomainError> {
        Ok(related.into_iter().map(RelatedSummary::from_mirror).collect())
    }

    fn name(&self) -> &'static str {
        "mirror-only"
    }
}

/// Joins each related node back to the vector store. One read per result.
pub struct ContentEnricher {
    vector_store: Arc<VectorStore>,
}

impl ContentEnricher {
    pub fn new(vector_store: Arc<VectorStore>) -> Self {
        Self { vector_store }
    }
}

#[async_trait]
impl RelatedEnricher for ContentEnricher {
    async fn enrich(
        &self,
        related: Vec<RelatedDocument>,
    ) -> Result<Vec<RelatedSummary>, DomainError> {
        let mut summaries = Vec::with_capacity(related.len());

        for entry in related {
            let document = self.vector_store.get(&entry.node.id).await?;
            let summary = RelatedSummary::from_mirror(entry);
            match document {
                Some(doc) => summaries.push(summary.with_document(doc.without_embedding())),
                None => {
                    debug!(
                        "Related node {} has no document in the vector store",
                        summary.document_id
                    );
                    summaries.push(summary);
                }
            }
        }

        Ok(summaries)
    }

    fn name(&self) -> &'static str {
        "content"
    }
}
