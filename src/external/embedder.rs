//! Embedding model boundary

use crate::error::{Error, Result};
use crate::vector::Vector;
use async_trait::async_trait;
use std::collections::HashMap;

/// Text embedding model, consumed as a black box.
///
/// Must be deterministic for identical input and always produce vectors of
/// `dimension()` length.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vector>;

    /// Dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// Human-readable model name (used in logs).
    fn name(&self) -> &str;
}

/// Deterministic feature-hashing bag-of-words embedder.
///
/// Hashes lowercase alphanumeric terms into fixed buckets weighted by term
/// frequency, then L2-normalizes. Shares no semantics across synonyms; it
/// exists so the engine can run without a neural model (CLI, tests).
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// FNV-1a
    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() >= 2)
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn vectorize(&self, text: &str) -> Vector {
        let tokens = Self::tokenize(text);
        let mut v = vec![0.0f32; self.dimension];
        if tokens.is_empty() {
            return v;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }
        let total = tokens.len() as f32;
        for (term, count) in tf {
            v[Self::bucket(term, self.dimension)] += count / total;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vector> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Embedder that always fails, for degraded-mode wiring and tests.
pub struct UnavailableEmbedder {
    dimension: usize,
}

impl UnavailableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vector> {
        Err(Error::Embedding("embedding model unavailable".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
