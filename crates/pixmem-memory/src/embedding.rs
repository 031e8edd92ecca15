use async_trait::async_trait;
use pixmem_core::{PixmemError, PixmemResult, DEFAULT_EMBEDDING_DIM};
use std::collections::HashMap;
use std::time::Duration;

/// Trait for computing text embeddings (vector representations).
///
/// One provider is chosen when a collection is mounted and must stay fixed
/// for its lifetime: the vector index compares raw L2 distances, so vectors
/// from different providers (or dimensions) are not comparable. Swapping
/// providers requires a full rescan with `rebuild`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute the embedding vector for a single text.
    async fn embed(&self, text: &str) -> PixmemResult<Vec<f32>>;

    /// Dimension of the vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Deterministic local hashed bag-of-words embedding.
///
/// No external service needed: tokens hash to a handful of positions in a
/// fixed-size vector weighted by term frequency, and the result is
/// L2-normalized so squared distances stay in `[0, 4]`. Good enough for
/// OCR/caption text search on a single local collection.
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    /// Creates a provider emitting vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> PixmemResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(PixmemError::Embedding("cannot embed empty text".into()));
        }

        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .collect();

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *freq.entry(token).or_insert(0.0) += 1.0;
        }

        let total = tokens.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        for (token, count) in &freq {
            let tf = count / total;
            // Three hash positions per token for better spread.
            let bytes = token.as_bytes();
            let h0 = fnv1a(bytes, 0) as usize;
            let h1 = fnv1a(bytes, 1) as usize;
            let h2 = fnv1a(bytes, 2) as usize;

            vector[h0 % self.dimension] += tf;
            vector[h1 % self.dimension] += tf * 0.7;
            vector[h2 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// FNV-1a with a seed byte folded in first, so the same token lands on
/// independent positions.
fn fnv1a(bytes: &[u8], seed: u8) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    hash ^= u64::from(seed);
    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Remote embedding via an Ollama endpoint (`POST /api/embeddings`).
///
/// The dimension is declared at construction and enforced on every
/// response, so a model swap behind the endpoint surfaces as an error
/// instead of silently corrupting the index.
pub struct OllamaEmbedding {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedding {
    /// Creates a provider against the given Ollama base URL and model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> PixmemResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PixmemError::Embedding(format!(
                "embedding endpoint returned {}",
                resp.status()
            )));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PixmemError::Http(e.to_string()))?;

        let vector: Vec<f32> = value["embedding"]
            .as_array()
            .ok_or_else(|| PixmemError::Embedding("response missing embedding array".into()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if vector.len() != self.dimension {
            return Err(PixmemError::Embedding(format!(
                "model returned dimension {} but index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic() {
        let embedder = HashEmbedding::new(64);
        let a = embedder.embed("sunset over the harbor").await.unwrap();
        let b = embedder.embed("sunset over the harbor").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embed_is_normalized() {
        let embedder = HashEmbedding::default();
        let v = embedder.embed("grocery receipt total due").await.unwrap();
        assert_eq!(v.len(), DEFAULT_EMBEDDING_DIM);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn similar_text_is_closer_than_unrelated() {
        let embedder = HashEmbedding::new(128);
        let query = embedder.embed("birthday cake candles party").await.unwrap();
        let close = embedder.embed("a birthday party with cake").await.unwrap();
        let far = embedder.embed("quarterly earnings spreadsheet").await.unwrap();

        let d_close: f32 = query
            .iter()
            .zip(&close)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        let d_far: f32 = query.iter().zip(&far).map(|(a, b)| (a - b) * (a - b)).sum();
        assert!(d_close < d_far);
    }

    #[tokio::test]
    async fn embed_rejects_empty_text() {
        let embedder = HashEmbedding::default();
        assert!(embedder.embed("   ").await.is_err());
    }
}
