//! Embedding function abstraction.
//!
//! Used by the vector index to embed documents and queries, and by the
//! recommender to embed candidate items that carry no stored vector.

use async_trait::async_trait;

use crate::error::StoreError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short identifier used in logs (e.g. "token-hash", "openai").
    fn name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| StoreError::EmbeddingFailed(format!("{} returned no vector", self.name())))
    }
}
