//! fastembed-backed ONNX embedding provider (feature `embeddings`)
//!
//! Loads nomic-embed-text-v1.5 (768 dimensions, 8192 token context) lazily
//! on first use; model files download into the platform cache directory.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{Embedding, EmbeddingProvider, MAX_TEXT_LENGTH};
use crate::error::{EngineError, Result};

const MODEL_ID: &str = "nomic-ai/nomic-embed-text-v1.5";
const MODEL_DIMENSIONS: usize = 768;

static MODEL: OnceLock<std::result::Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("ENGRAM_EMBED_CACHE") {
        return std::path::PathBuf::from(path);
    }
    if let Some(dirs) = directories::ProjectDirs::from("ai", "engram", "core") {
        return dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>> {
    let result = MODEL.get_or_init(|| {
        let dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create embed cache dir");
        }
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(dir);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize {}: {}", MODEL_ID, e))
    });
    match result {
        Ok(m) => m
            .lock()
            .map_err(|_| EngineError::Internal("embedding model lock poisoned".to_string())),
        Err(e) => Err(EngineError::Unavailable(e.clone())),
    }
}

/// ONNX embedding provider backed by fastembed
pub struct FastembedProvider {
    _private: (),
}

impl FastembedProvider {
    /// Create the provider; the model loads lazily on first embed
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for FastembedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for FastembedProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "cannot embed empty text".to_string(),
            ));
        }
        let truncated = &text[..text.len().min(MAX_TEXT_LENGTH)];
        let mut guard = model()?;
        let vectors = guard
            .embed(vec![truncated.to_string()], None)
            .map_err(|e| EngineError::Unavailable(format!("embedding failed: {}", e)))?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Unavailable("model returned no vector".to_string()))?;
        Ok(Embedding::new(vector))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let inputs: Vec<String> = texts
            .iter()
            .map(|t| t[..t.len().min(MAX_TEXT_LENGTH)].to_string())
            .collect();
        let mut guard = model()?;
        let vectors = guard
            .embed(inputs, None)
            .map_err(|e| EngineError::Unavailable(format!("batch embedding failed: {}", e)))?;
        Ok(vectors.into_iter().map(Embedding::new).collect())
    }

    fn dimensions(&self) -> usize {
        MODEL_DIMENSIONS
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}
