use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::application::EmbeddingService;
use crate::domain::{l2_normalize, DomainError, EmbeddingConfig, EMBEDDING_DIMENSIONS};

const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_MAX_SEQ_LENGTH: usize = 256;

struct LoadedModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_len: usize,
}

/// Sentence embeddings from an ONNX export of MiniLM, mean-pooled and L2-normalized.
pub struct OrtEmbedding {
    model: Arc<LoadedModel>,
    config: EmbeddingConfig,
}

impl OrtEmbedding {
    /// Fetches the model through the Hugging Face hub, caching under `cache_dir`
    /// when given.
    pub fn new(model_id: Option<&str>, cache_dir: Option<&Path>) -> Result<Self, DomainError> {
        let model_id = model_id.unwrap_or(DEFAULT_MODEL_ID);
        info!("Initializing ORT embedding service with model: {}", model_id);

        let mut builder = hf_hub::api::sync::ApiBuilder::new().with_progress(true);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir.to_path_buf());
        }
        let api = builder
            .build()
            .map_err(|e| DomainError::embedding(format!("Failed to create HF API: {}", e)))?;
        let repo = api.model(model_id.to_string());

        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| DomainError::embedding(format!("Failed to download tokenizer: {}", e)))?;
        let model_path = repo
            .get("model.onnx")
            .or_else(|_| repo.get("onnx/model.onnx"))
            .map_err(|e| DomainError::embedding(format!("Failed to download ONNX model: {}", e)))?;

        Self::from_paths(model_path, tokenizer_path, model_id)
    }

    pub fn from_paths(
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        model_name: &str,
    ) -> Result<Self, DomainError> {
        info!("Loading ONNX model from: {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| DomainError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DomainError::embedding(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| DomainError::embedding(format!("Failed to load ONNX model: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| DomainError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            model: Arc::new(LoadedModel {
                session: Mutex::new(session),
                tokenizer,
                max_len: DEFAULT_MAX_SEQ_LENGTH,
            }),
            config: EmbeddingConfig::new(
                model_name.to_string(),
                EMBEDDING_DIMENSIONS,
                DEFAULT_MAX_SEQ_LENGTH,
            ),
        })
    }
}

impl LoadedModel {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| DomainError::embedding(format!("Tokenization failed: {}", e)))?;

        let len = encoding.get_ids().len().min(self.max_len);
        let to_i64 = |values: &[u32]| values[..len].iter().map(|&x| x as i64).collect::<Vec<_>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());

        let shape = [1usize, len];
        let tensor = |name: &str, data: Vec<i64>| {
            Tensor::from_array((shape, data)).map_err(|e| {
                DomainError::embedding(format!("Failed to create {} tensor: {}", name, e))
            })
        };
        let input_ids_tensor = tensor("input_ids", input_ids)?;
        let attention_mask_tensor = tensor("attention_mask", attention_mask.clone())?;
        let token_type_ids_tensor = tensor("token_type_ids", token_type_ids)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| DomainError::internal(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| DomainError::embedding(format!("Inference failed: {}", e)))?;

        let output_value = outputs
            .iter()
            .next()
            .map(|(_, v)| v)
            .ok_or_else(|| DomainError::embedding("No output tensor found"))?;

        let (shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| DomainError::embedding(format!("Failed to extract output tensor: {}", e)))?;
        let shape: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
        debug!("Output tensor shape: {:?}", shape);

        let mut embedding = match shape.as_slice() {
            [_, seq_len, hidden] => mean_pool(data, &attention_mask, *seq_len, *hidden),
            [_, hidden] => data[..*hidden].to_vec(),
            other => {
                return Err(DomainError::embedding(format!(
                    "Unexpected output tensor shape: {:?}",
                    other
                )))
            }
        };

        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Average of the token vectors the attention mask keeps.
fn mean_pool(data: &[f32], mask: &[i64], seq_len: usize, hidden: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (j, &m) in mask.iter().enumerate().take(seq_len) {
        if m == 0 {
            continue;
        }
        let row = &data[j * hidden..(j + 1) * hidden];
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
        count += 1.0;
    }

    if count > 0.0 {
        for v in &mut pooled {
            *v /= count;
        }
    }
    pooled
}

#[async_trait]
impl EmbeddingService for OrtEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed_text(&text))
            .await
            .map_err(|e| DomainError::internal(format!("Embedding task failed: {}", e)))?
    }

    fn config(&self) -> &EmbeddingConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_skips_masked_tokens() {
        let data = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let pooled = mean_pool(&data, &[1, 1, 0], 3, 2);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[tokio::test]
    #[ignore = "Requires model download"]
    async fn test_ort_embedding_service() {
        let service = OrtEmbedding::new(None, None).expect("Failed to create service");

        let embedding = service.embed("Regulation on artificial intelligence").await.unwrap();

        assert_eq!(embedding.len(), EMBEDDING_DIMENSIONS);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
