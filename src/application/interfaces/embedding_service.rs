use async_trait::async_trait;

use crate::domain::{DomainError, EmbeddingConfig};

/// Turns text into a fixed-length dense vector.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    fn config(&self) -> &EmbeddingConfig;
}
