//! Item embeddings: segment → encode → mean-pool over tokens, then over sentences.
//!
//! Empty text is an explicit [`EmbeddingError::EmptyInput`]. It is never sent to the
//! encoder, where it would come back as an all-padding vector.

use std::sync::Arc;

use crate::encoder::{EncoderError, TextEncoder, TokenStates};
use crate::segment::Segmenter;

/// Fixed-length item vector. Length is defined by the encoder's model.
pub type Embedding = Vec<f32>;

/// Pools encoder output into one vector per item. Holds the shared encoder.
pub struct Embedder<E> {
    encoder: Arc<E>,
    segmenter: Segmenter,
}

impl<E: TextEncoder> Embedder<E> {
    pub fn new(encoder: Arc<E>, segmenter: Segmenter) -> Self {
        Self { encoder, segmenter }
    }

    pub fn encoder(&self) -> &Arc<E> {
        &self.encoder
    }

    /// Segment `text`, then embed its sentences.
    pub async fn embed_text(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let sentences = self.segmenter.segment(text).to_vec();
        self.embed_sentences(&sentences).await
    }

    /// Embed pre-segmented sentences.
    pub async fn embed_sentences(&self, sentences: &[String]) -> Result<Embedding, EmbeddingError> {
        if sentences.iter().all(|s| s.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }
        let states = self.encoder.encode(sentences).await?;
        check_count(sentences.len(), states.len())?;
        pool(&states)
    }

    /// Embed several items with a single encoder call.
    ///
    /// Pooling stays per item. Items without sentences get `EmptyInput` and are not
    /// sent. The outer error means the encoder call itself failed for the whole batch.
    pub async fn embed_batch(
        &self,
        texts: &[&str],
    ) -> Result<Vec<Result<Embedding, EmbeddingError>>, EmbeddingError> {
        let mut sentences: Vec<String> = Vec::new();
        // (start, end) into `sentences` per item; None for empty items.
        let mut spans: Vec<Option<(usize, usize)>> = Vec::with_capacity(texts.len());
        for text in texts {
            let start = sentences.len();
            sentences.extend(self.segmenter.segment(text).iter().map(str::to_string));
            let end = sentences.len();
            spans.push((end > start).then_some((start, end)));
        }

        let states = if sentences.is_empty() {
            Vec::new()
        } else {
            self.encoder.encode(&sentences).await?
        };
        check_count(sentences.len(), states.len())?;

        Ok(spans
            .into_iter()
            .map(|span| match span {
                Some((start, end)) => pool(&states[start..end]),
                None => Err(EmbeddingError::EmptyInput),
            })
            .collect())
    }
}

fn check_count(expected: usize, got: usize) -> Result<(), EmbeddingError> {
    if expected == got {
        Ok(())
    } else {
        Err(EncoderError::Count { expected, got }.into())
    }
}

/// Masked mean over each sentence's tokens, then plain mean over sentences.
/// Every sentence weighs the same regardless of its token count.
fn pool(sentences: &[TokenStates]) -> Result<Embedding, EmbeddingError> {
    let first = sentences.first().ok_or(EmbeddingError::EmptyInput)?;
    let width = first.hidden.len();
    let dim = first.hidden.first().map(Vec::len).unwrap_or(0);
    if dim == 0 {
        return Err(EmbeddingError::Shape("encoder returned empty hidden states".into()));
    }

    let mut total = vec![0f64; dim];
    for (i, states) in sentences.iter().enumerate() {
        if states.hidden.len() != width {
            return Err(EmbeddingError::Shape(format!(
                "sentence {i} is padded to {} positions, sentence 0 to {width}",
                states.hidden.len()
            )));
        }
        if states.hidden.len() != states.mask.len() {
            return Err(EmbeddingError::Shape(format!(
                "sentence {i}: {} rows but {} mask entries",
                states.hidden.len(),
                states.mask.len()
            )));
        }
        let mut sentence_sum = vec![0f64; dim];
        let mut tokens = 0usize;
        for (row, _) in states.hidden.iter().zip(&states.mask).filter(|(_, keep)| **keep) {
            if row.len() != dim {
                return Err(EmbeddingError::Shape(format!(
                    "sentence {i}: row width {} differs from {dim}",
                    row.len()
                )));
            }
            for (acc, v) in sentence_sum.iter_mut().zip(row) {
                *acc += f64::from(*v);
            }
            tokens += 1;
        }
        if tokens == 0 {
            return Err(EmbeddingError::Shape(format!("sentence {i} has no unmasked tokens")));
        }
        for (acc, v) in total.iter_mut().zip(&sentence_sum) {
            *acc += v / tokens as f64;
        }
    }

    let n = sentences.len() as f64;
    Ok(total.into_iter().map(|v| (v / n) as f32).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("no sentences left after segmentation")]
    EmptyInput,
    #[error("encoder failed: {0}")]
    Encoder(#[from] EncoderError),
    #[error("malformed encoder output: {0}")]
    Shape(String),
}
