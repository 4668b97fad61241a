//! Deterministic offline embeddings.
//!
//! Each lowercase alphanumeric token is hashed (FNV-1a, 64 bit) into one of
//! `dimensions` buckets with a sign taken from the upper half of the hash,
//! then the vector is L2-normalized. Texts sharing vocabulary end up close;
//! no model or network is needed.

use async_trait::async_trait;
use feedloom_core::embedding::Embedder;
use feedloom_core::error::StoreError;

pub struct TokenHashEmbedder {
    dimensions: usize,
}

impl TokenHashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let h = fnv1a64(&token);
            let idx = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for TokenHashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for TokenHashEmbedder {
    fn name(&self) -> &str {
        "token-hash"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 14695981039346656037;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
