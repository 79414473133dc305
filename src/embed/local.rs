//! Deterministic fallback vectorizer: hashed term frequencies, L2 normalized.

use crc32fast::Hasher as Crc32;

use super::{EmbeddingProvider, ProviderDescriptor, ProviderError};
use crate::text::tokenize;

/// Model name recorded for locally produced vectors.
pub const LOCAL_MODEL: &str = "hashed-tf";

/// Maps each token to slot `crc32(token) % dimension` and accumulates its
/// relative frequency there.
///
/// Slots depend only on the token, so vectors from different runs and
/// batches share one space.
#[derive(Debug, Clone)]
pub struct LocalVectorizer {
    dimension: usize,
}

impl LocalVectorizer {
    /// Vectorizer producing `dimension`-long vectors (at least 1).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Vector length.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector for one text; empty or token-free text maps to the zero vector.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vector;
        }
        let weight = 1.0 / tokens.len() as f32;
        for token in &tokens {
            vector[self.slot(token)] += weight;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }

    fn slot(&self, token: &str) -> usize {
        let mut hasher = Crc32::new();
        hasher.update(token.as_bytes());
        hasher.finalize() as usize % self.dimension
    }
}

impl EmbeddingProvider for LocalVectorizer {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider: "local".into(),
            model: LOCAL_MODEL.into(),
            dimension: self.dimension,
        }
    }

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(inputs.iter().map(|text| self.vectorize(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    #[test]
    fn vectors_are_unit_length_and_deterministic() {
        let local = LocalVectorizer::new(384);
        let a = local.vectorize("スコアカードの管理方法 golf score");
        let b = local.vectorize("スコアカードの管理方法 golf score");
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_stays_zero() {
        let local = LocalVectorizer::new(16);
        let zero = local.vectorize("  の 、 ");
        assert_eq!(zero, vec![0.0; 16]);
    }

    #[test]
    fn batch_matches_single_calls() {
        let local = LocalVectorizer::new(32);
        let batch = local.embed_batch(&["golf swing", "putting"]).unwrap();
        assert_eq!(batch[0], local.vectorize("golf swing"));
        assert_eq!(batch[1], local.vectorize("putting"));
    }
}
