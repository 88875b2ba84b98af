//! Ollama-backed [`TextEncoder`]. Wraps ollama-rs with a simple API.
//!
//! Ollama tokenizes, truncates and pools on the server, so each sentence comes
//! back as a single row of already pooled token states. Every request carries
//! the context length as `num_ctx` with truncation switched on.

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use tracing::debug;

use crate::encoder::{EncoderError, TextEncoder, TokenStates};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Context length of the default model.
pub const DEFAULT_MAX_LENGTH: usize = 2048;

/// Thin wrapper around Ollama for sentence embeddings.
#[derive(Debug, Clone)]
pub struct OllamaEncoder {
    inner: Ollama,
    embed_model: String,
    max_length: usize,
}

impl OllamaEncoder {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, EncoderError> {
        let inner = Ollama::try_new(url)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            max_length: DEFAULT_MAX_LENGTH,
        })
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Context length sent with every request; longer sentences are cut to it.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }
}

#[async_trait]
impl TextEncoder for OllamaEncoder {
    fn max_length(&self) -> usize {
        self.max_length
    }

    async fn encode(&self, sentences: &[String]) -> Result<Vec<TokenStates>, EncoderError> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Encoding {} sentences with {}", sentences.len(), self.embed_model);
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(sentences.to_vec()),
        )
        .truncate(true)
        .options(ModelOptions::default().num_ctx(self.max_length() as u64));
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(|e| EncoderError::Request(e.to_string()))?;
        if res.embeddings.len() != sentences.len() {
            return Err(EncoderError::Count {
                expected: sentences.len(),
                got: res.embeddings.len(),
            });
        }
        Ok(res.embeddings.into_iter().map(TokenStates::pooled).collect())
    }
}
