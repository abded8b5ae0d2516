use async_trait::async_trait;
use rand::Rng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::application::EmbeddingService;
use crate::domain::{l2_normalize, DomainError, EmbeddingConfig, EMBEDDING_DIMENSIONS};

/// Deterministic embedding without a model.
///
/// Every lowercase word maps to a fixed pseudo-random direction and a text is
/// the normalized sum of its words, so texts sharing vocabulary land close
/// together.
pub struct MockEmbedding {
    config: EmbeddingConfig,
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(EMBEDDING_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            config: EmbeddingConfig::new("mock-embedding".to_string(), dimensions, 512),
        }
    }

    fn token_direction(&self, token: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());
        (0..self.config.dimensions())
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect()
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.config.dimensions()];

        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in tokens {
            for (acc, x) in vector.iter_mut().zip(self.token_direction(&token)) {
                *acc += x;
            }
        }

        // Blank text still gets a stable unit vector.
        if vector.iter().all(|x| *x == 0.0) {
            vector = self.token_direction("");
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let vector = self.generate_embedding(text);
        debug!("Generated mock embedding with {} dimensions", vector.len());
        Ok(vector)
    }

    fn config(&self) -> &EmbeddingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedding_consistency() {
        let service = MockEmbedding::new();

        let embedding1 = service.embed("hello world").await.unwrap();
        let embedding2 = service.embed("Hello, WORLD").await.unwrap();

        assert_eq!(embedding1, embedding2);
    }

    #[tokio::test]
    async fn test_mock_embedding_dimensions() {
        let service = MockEmbedding::with_dimensions(128);

        let embedding = service.embed("test").await.unwrap();

        assert_eq!(embedding.len(), 128);
    }

    #[tokio::test]
    async fn test_mock_embedding_normalized() {
        let service = MockEmbedding::new();

        for text in ["test", "", "a longer sentence about privacy"] {
            let embedding = service.embed(text).await.unwrap();
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((magnitude - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn shared_words_are_closer() {
        let service = MockEmbedding::new();

        let query = service.embed("data protection regulation").await.unwrap();
        let related = service.embed("general data protection regulation text").await.unwrap();
        let unrelated = service.embed("fishing quota for atlantic cod").await.unwrap();

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }
}
