use async_trait::async_trait;

use crate::domain::{DomainError, RelatedDocument, RelatedSummary};

/// Post-processing step applied to graph traversal results.
#[async_trait]
pub trait RelatedEnricher: Send + Sync {
    async fn enrich(&self, related: Vec<RelatedDocument>)
        -> Result<Vec<RelatedSummary>, DomainError>;

    fn name(&self) -> &'static str;
}
