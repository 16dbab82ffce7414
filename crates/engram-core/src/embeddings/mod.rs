//! Embeddings - dense vectors for semantic search
//!
//! The engine talks to embedders through [`EmbeddingProvider`]. The default
//! implementation is fully deterministic (identical input and model id give
//! identical vectors), requires no model download, and keeps tests and
//! air-gapped deployments working. A fastembed-backed ONNX provider is
//! available behind the `embeddings` feature.
//!
//! Model identity is persisted next to every stored vector so a model change
//! is detected as drift and re-embedded rather than silently mixed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};

#[cfg(feature = "embeddings")]
mod local;
#[cfg(feature = "embeddings")]
pub use local::FastembedProvider;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default embedding dimensionality
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Maximum text length embedded; longer inputs are truncated
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// EMBEDDING TYPE
// ============================================================================

/// A dense embedding vector
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The vector components
    pub vector: Vec<f32>,
    /// Dimensionality
    pub dimensions: usize,
}

impl Embedding {
    /// Create a new embedding from a vector
    pub fn new(vector: Vec<f32>) -> Self {
        let dimensions = vector.len();
        Self { vector, dimensions }
    }

    /// Cosine similarity with another embedding (0.0 on dimension mismatch)
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.vector, &other.vector)
    }

    /// Normalize to unit length in place
    pub fn normalize(&mut self) {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut self.vector {
                *x /= norm;
            }
        }
    }

    /// Little-endian f32 bytes for BLOB storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Decode from BLOB bytes; None when the length is not a multiple of 4
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Some(Self::new(vector))
    }
}

/// Cosine similarity between two raw vectors.
///
/// Returns 0.0 for mismatched dimensions or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Generate embeddings from text.
///
/// Implementations must be `Send + Sync` (called from blocking tasks) and
/// deterministic for a given (model id, text) pair.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Fails with `Unavailable` when the backing model
    /// cannot serve; callers tolerate missing embeddings.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch. Default implementation loops over `embed`;
    /// high-throughput providers override with a native batch call.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Dimensionality of produced vectors
    fn dimensions(&self) -> usize;

    /// Opaque model identity persisted alongside each embedding
    fn model_id(&self) -> &str;
}

// ============================================================================
// SEEDED PROVIDER (default)
// ============================================================================

/// Deterministic embedding provider: a unit vector drawn from an RNG seeded
/// by SHA-256(model_id, token-normalized text).
///
/// Not semantically meaningful across unrelated texts, but identical inputs
/// always map to identical vectors, which is what dedup, drift detection,
/// and the test suite need. Token-level overlap contributes nothing; exact
/// repeats are the only guaranteed neighbors.
pub struct SeededProvider {
    dims: usize,
    model: String,
}

impl SeededProvider {
    /// Create a provider with the given dimensionality
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            model: format!("seeded-unit-v1/{}", dims),
        }
    }
}

impl Default for SeededProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingProvider for SeededProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "cannot embed empty text".to_string(),
            ));
        }
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let truncated = &normalized[..normalized.len().min(MAX_TEXT_LENGTH)];

        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update(b"\x00");
        hasher.update(truncated.as_bytes());
        let digest = hasher.finalize();
        let seed = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));

        let mut rng = StdRng::seed_from_u64(seed);
        let raw: Vec<f32> = (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut embedding = Embedding::new(raw);
        embedding.normalize();
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// QUERY-EMBEDDING CACHE
// ============================================================================

/// LRU-caching wrapper around any provider.
///
/// Recall embeds the same query strings over and over (retries, cache-miss
/// re-runs, tier-2 passes); this keeps the hot ones out of the model.
pub struct CachedProvider {
    inner: std::sync::Arc<dyn EmbeddingProvider>,
    cache: std::sync::Mutex<lru::LruCache<String, Vec<f32>>>,
}

impl CachedProvider {
    /// Wrap a provider with a cache of the given capacity
    pub fn new(inner: std::sync::Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: std::sync::Mutex::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero"),
            )),
        }
    }
}

impl EmbeddingProvider for CachedProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(vector) = cache.get(text) {
                return Ok(Embedding::new(vector.clone()));
            }
        }
        let embedding = self.inner.embed(text)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text.to_string(), embedding.vector.clone());
        }
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        // Batch paths are bulk re-embeds; bypass the cache
        self.inner.embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// TESTS
// ============================================================================
