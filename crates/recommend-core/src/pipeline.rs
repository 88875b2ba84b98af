//! Run pipeline: discover → fetch + extract → embed → merge. Builds the brand dataset.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::pin;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::catalog::{discover, CatalogError, CatalogRecord, CatalogSelectors, ItemId};
use crate::config::{Config, OnItemError};
use crate::embed::{Embedder, Embedding};
use crate::encoder::TextEncoder;
use crate::extract::{ExtractedFields, FieldExtractor, FieldValue, SelectorError};
use crate::fetch::{FetchError, Fetcher, Pacer};
use crate::merge::{merge, MergeError, MergedRecord};
use crate::segment::Segmenter;

/// Lifecycle of one catalog item. Fields only exist once the page was fetched,
/// and a resolved item is never fetched again.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemState {
    Pending,
    Resolved(ExtractedFields),
    Skipped(SkipReason),
}

/// An item state that can no longer be pending.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Resolved(ExtractedFields),
    Skipped(SkipReason),
}

impl ItemState {
    /// Settle a pending item with its fetch outcome. Settled items keep what they
    /// have and ignore `outcome`.
    pub fn settle(self, outcome: Result<ExtractedFields, FetchError>) -> Settled {
        match self {
            Self::Pending => match outcome {
                Ok(fields) => Settled::Resolved(fields),
                Err(e) => Settled::Skipped(SkipReason::Fetch(e.to_string())),
            },
            Self::Resolved(fields) => Settled::Resolved(fields),
            Self::Skipped(reason) => Settled::Skipped(reason),
        }
    }

    pub fn fields(&self) -> Option<&ExtractedFields> {
        match self {
            Self::Resolved(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<Settled> for ItemState {
    fn from(settled: Settled) -> Self {
        match settled {
            Settled::Resolved(fields) => Self::Resolved(fields),
            Settled::Skipped(reason) => Self::Skipped(reason),
        }
    }
}

/// Why an item is missing from the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Fetch(String),
    Embedding(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Embedding(e) => write!(f, "embedding failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub id: ItemId,
    pub url: String,
    pub reason: SkipReason,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Records in the (possibly limited) catalog.
    pub discovered: usize,
    pub merged: usize,
    pub skipped: Vec<SkippedItem>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} items embedded and merged, {} skipped.",
            self.merged,
            self.discovered,
            self.skipped.len()
        )?;
        for s in &self.skipped {
            write!(f, "\n  {} {}: {}", s.id, s.url, s.reason)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub dataset: Vec<MergedRecord>,
    pub report: RunReport,
}

/// Everything a run needs, built once from config. The encoder is injected.
pub struct Pipeline<E> {
    config: Config,
    fetcher: Fetcher,
    selectors: CatalogSelectors,
    extractor: FieldExtractor,
    embedder: Embedder<E>,
}

impl<E: TextEncoder> Pipeline<E> {
    pub fn new(config: Config, encoder: Arc<E>) -> Result<Self, PipelineError> {
        let pacer = Arc::new(Pacer::new(config.request_delay()));
        let fetcher = Fetcher::new(&config.user_agent, pacer)?;
        let embedder = Embedder::new(encoder, Segmenter::new(&config.terminals));
        Ok(Self {
            fetcher,
            selectors: CatalogSelectors::default(),
            extractor: FieldExtractor::brand_page()?,
            embedder,
            config,
        })
    }

    /// Replace the listing-page selectors.
    pub fn with_selectors(mut self, selectors: CatalogSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Replace the brand-page field chains.
    pub fn with_extractor(mut self, extractor: FieldExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Discover the catalog, honoring `limit`.
    pub async fn catalog(&self) -> Result<Vec<CatalogRecord>, PipelineError> {
        let mut records = discover(&self.fetcher, &self.config.listing_url, &self.selectors).await?;
        if let Some(limit) = self.config.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Runs the full pipeline. Catalog and merge faults are fatal; item faults
    /// follow `on_item_error`.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let records = self.catalog().await?;
        let mut report = RunReport {
            discovered: records.len(),
            ..RunReport::default()
        };

        // Items settle in catalog order; an abort drops the stream and its in-flight fetches.
        let mut settled = pin!(stream::iter(&records)
            .map(|record| async move { (record, ItemState::Pending.settle(self.resolve(record).await)) })
            .buffered(self.config.concurrency.max(1)));
        let mut fields: BTreeMap<ItemId, ExtractedFields> = BTreeMap::new();
        while let Some((record, state)) = settled.next().await {
            match state {
                Settled::Resolved(f) => {
                    fields.insert(record.id, f);
                }
                Settled::Skipped(reason) => self.skip(&mut report, record, reason)?,
            }
        }
        info!("Fetched {} of {} pages", fields.len(), records.len());

        let vectors = self.embed_all(&records, &fields, &mut report).await?;
        fields.retain(|id, _| vectors.contains_key(id));

        let completed: Vec<CatalogRecord> = records
            .iter()
            .filter(|r| vectors.contains_key(&r.id))
            .cloned()
            .collect();
        let dataset = merge(&completed, &fields, &vectors)?;
        report.merged = dataset.len();
        info!("{}", report);
        Ok(RunOutcome { dataset, report })
    }

    /// Fetch and extract one record. All fetches share the pipeline's pacer.
    async fn resolve(&self, record: &CatalogRecord) -> Result<ExtractedFields, FetchError> {
        let page = self.fetcher.fetch(&record.source_url).await?;
        let fields = self.extractor.extract(&page.document());
        for (name, value) in [
            ("review_text", &fields.review_text),
            ("description", &fields.description),
            ("characteristics", &fields.characteristics),
        ] {
            if let FieldValue::Absent { reason } = value {
                debug!("{} {}: {} absent ({})", record.id, record.name, name, reason);
            }
        }
        Ok(fields)
    }

    async fn embed_all(
        &self,
        records: &[CatalogRecord],
        fields: &BTreeMap<ItemId, ExtractedFields>,
        report: &mut RunReport,
    ) -> Result<BTreeMap<ItemId, Embedding>, PipelineError> {
        let resolved: Vec<(&CatalogRecord, String)> = records
            .iter()
            .filter_map(|r| fields.get(&r.id).map(|f| (r, f.embedding_text())))
            .collect();

        debug!(
            "Embedding {} items, sentences capped at {} tokens",
            resolved.len(),
            self.embedder.encoder().max_length()
        );
        let mut vectors = BTreeMap::new();
        for batch in resolved.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|(_, text)| text.as_str()).collect();
            match self.embedder.embed_batch(&texts).await {
                Ok(results) => {
                    for ((record, _), result) in batch.iter().zip(results) {
                        match result {
                            Ok(vector) => {
                                vectors.insert(record.id, vector);
                            }
                            Err(e) => self.skip(report, record, SkipReason::Embedding(e.to_string()))?,
                        }
                    }
                }
                Err(e) => {
                    let reason = SkipReason::Embedding(e.to_string());
                    for (record, _) in batch {
                        self.skip(report, record, reason.clone())?;
                    }
                }
            }
        }
        info!("Embedded {} of {} items", vectors.len(), resolved.len());
        Ok(vectors)
    }

    fn skip(
        &self,
        report: &mut RunReport,
        record: &CatalogRecord,
        reason: SkipReason,
    ) -> Result<(), PipelineError> {
        if self.config.on_item_error == OnItemError::Abort {
            return Err(PipelineError::Item {
                id: record.id,
                reason,
            });
        }
        warn!("Skipping {} ({}): {}", record.id, record.source_url, reason);
        report.skipped.push(SkippedItem {
            id: record.id,
            url: record.source_url.clone(),
            reason,
        });
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("catalog discovery failed: {0}")]
    Catalog(#[from] CatalogError),
    #[error("fetcher setup failed: {0}")]
    Fetcher(#[from] FetchError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error("item {id} failed: {reason}")]
    Item { id: ItemId, reason: SkipReason },
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_skips() {
        let report = RunReport {
            discovered: 3,
            merged: 2,
            skipped: vec![SkippedItem {
                id: ItemId(1),
                url: "http://example.jp/b/".into(),
                reason: SkipReason::Fetch("http://example.jp/b/ answered with status 404".into()),
            }],
        };
        assert_eq!(
            report.to_string(),
            "2 of 3 items embedded and merged, 1 skipped.\n  001 http://example.jp/b/: fetch failed: http://example.jp/b/ answered with status 404"
        );
    }

    fn fields() -> ExtractedFields {
        ExtractedFields {
            review_text: FieldValue::Present("r".into()),
            description: FieldValue::Present("d".into()),
            characteristics: FieldValue::Present("c".into()),
        }
    }

    fn not_found() -> FetchError {
        FetchError::Status {
            url: "http://example.jp/x/".into(),
            status: 404,
        }
    }

    #[test]
    fn pending_settles_once() {
        let resolved = ItemState::from(ItemState::Pending.settle(Ok(fields())));
        assert_eq!(resolved.fields(), Some(&fields()));
        assert_eq!(resolved.settle(Err(not_found())), Settled::Resolved(fields()));
    }

    #[test]
    fn failed_fetch_settles_to_skipped() {
        let state = ItemState::from(ItemState::Pending.settle(Err(not_found())));
        assert!(state.fields().is_none());
        assert!(matches!(state, ItemState::Skipped(SkipReason::Fetch(_))));
        // A skipped item is not revived by a later success.
        assert!(matches!(state.settle(Ok(fields())), Settled::Skipped(_)));
    }

    #[test]
    fn clean_report_is_one_line() {
        let report = RunReport {
            discovered: 2,
            merged: 2,
            skipped: Vec::new(),
        };
        assert_eq!(report.to_string(), "2 of 2 items embedded and merged, 0 skipped.");
    }
}
