//! The text encoder capability consumed by the [`Embedder`](crate::embed::Embedder).
//!
//! An encoder is constructed once at startup and shared read-only. Implementations
//! own tokenization: every sentence is truncated to [`TextEncoder::max_length`]
//! tokens and padded so that all sentences of one call have the same width.

use async_trait::async_trait;

/// Token-level hidden states of one sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStates {
    /// One row per token position, padding included.
    pub hidden: Vec<Vec<f32>>,
    /// `true` for real tokens, `false` for padding. Same length as `hidden`.
    pub mask: Vec<bool>,
}

impl TokenStates {
    /// States of an already pooled sentence: a single unmasked row.
    pub fn pooled(vector: Vec<f32>) -> Self {
        Self {
            hidden: vec![vector],
            mask: vec![true],
        }
    }
}

#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Longest token sequence accepted per sentence; longer input is truncated.
    fn max_length(&self) -> usize;

    /// Encode each sentence. Returns one [`TokenStates`] per input, in order.
    async fn encode(&self, sentences: &[String]) -> Result<Vec<TokenStates>, EncoderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("invalid encoder URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("encoder request failed: {0}")]
    Request(String),
    #[error("encoder returned {got} results for {expected} sentences")]
    Count { expected: usize, got: usize },
}
