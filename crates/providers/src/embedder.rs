//! `Embedder` backed by a provider's embeddings endpoint.

use async_trait::async_trait;
use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;
use feedloom_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;

pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: texts.to_vec(),
            })
            .await
            .map_err(|e| StoreError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(StoreError::EmbeddingFailed(format!(
                "{} returned {} vectors for {} inputs",
                self.provider.name(),
                response.embeddings.len(),
                texts.len()
            )));
        }
        Ok(response.embeddings)
    }
}
