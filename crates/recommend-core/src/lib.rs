//! All pipeline logic independent of how it is run.
//!
//! A run discovers the brand catalog from the listing page, fetches each brand
//! page through one shared pacer, extracts its text fields, embeds review and
//! description with an injected [`TextEncoder`], and merges everything into one
//! dataset keyed by [`ItemId`].

pub mod app_data;
pub mod catalog;
pub mod config;
pub mod embed;
pub mod encoder;
pub mod extract;
pub mod fetch;
pub mod merge;
pub mod ollama;
pub mod pipeline;
pub mod segment;

pub use app_data::{app_data_dir, default_dataset_path};
pub use catalog::{discover, parse_listing, CatalogError, CatalogRecord, CatalogSelectors, ItemId};
pub use config::{load_config, save_config, Config, ConfigError, EncoderConfig, OnItemError};
pub use embed::{Embedder, Embedding, EmbeddingError};
pub use encoder::{EncoderError, TextEncoder, TokenStates};
pub use extract::{ExtractedFields, FieldExtractor, FieldValue, SelectorChain, SelectorError, Step};
pub use fetch::{FetchError, Fetcher, Page, Pacer};
pub use merge::{merge, write_json, MergeError, MergedRecord};
pub use ollama::OllamaEncoder;
pub use pipeline::{
    ItemState, Pipeline, PipelineError, RunOutcome, RunReport, Settled, SkipReason, SkippedItem,
};
pub use segment::{Segmenter, Segments};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "recommend-core ready"
}
