//! Joins catalog records, extracted characteristics and embeddings into the final dataset.
//! Strict inner join: a key missing on any side fails the merge instead of dropping a row.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogRecord, ItemId};
use crate::embed::Embedding;
use crate::extract::ExtractedFields;

/// One row of the output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub id: ItemId,
    pub category: String,
    pub name: String,
    pub source_url: String,
    pub characteristics: String,
    pub vector: Embedding,
}

/// Merge the three inputs on `id`. Output order follows `records`.
pub fn merge(
    records: &[CatalogRecord],
    fields: &BTreeMap<ItemId, ExtractedFields>,
    vectors: &BTreeMap<ItemId, Embedding>,
) -> Result<Vec<MergedRecord>, MergeError> {
    let mut catalog_ids = BTreeSet::new();
    for record in records {
        if !catalog_ids.insert(record.id) {
            return Err(MergeError::DuplicateId(record.id));
        }
    }

    let fields_diff = KeyDiff::between(&catalog_ids, fields.keys());
    let vectors_diff = KeyDiff::between(&catalog_ids, vectors.keys());
    if !fields_diff.is_empty() || !vectors_diff.is_empty() {
        return Err(MergeError::KeyMismatch {
            fields: fields_diff,
            vectors: vectors_diff,
        });
    }

    Ok(records
        .iter()
        .map(|record| MergedRecord {
            id: record.id,
            category: record.category.clone(),
            name: record.name.clone(),
            source_url: record.source_url.clone(),
            characteristics: fields[&record.id].characteristics.as_str().to_string(),
            vector: vectors[&record.id].clone(),
        })
        .collect())
}

/// Write rows as a pretty-printed JSON array.
pub fn write_json(path: &Path, rows: &[MergedRecord]) -> Result<(), MergeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MergeError::Write(path.to_path_buf(), e))?;
    }
    let json = serde_json::to_string_pretty(rows).map_err(MergeError::Serialize)?;
    std::fs::write(path, json).map_err(|e| MergeError::Write(path.to_path_buf(), e))
}

/// Ids one side is missing, and ids it has that the catalog does not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDiff {
    pub missing: Vec<ItemId>,
    pub unexpected: Vec<ItemId>,
}

impl KeyDiff {
    fn between<'a>(catalog: &BTreeSet<ItemId>, side: impl Iterator<Item = &'a ItemId>) -> Self {
        let side: BTreeSet<ItemId> = side.copied().collect();
        Self {
            missing: catalog.difference(&side).copied().collect(),
            unexpected: side.difference(catalog).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for KeyDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |ids: &[ItemId]| ids.iter().map(ItemId::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "missing [{}], unexpected [{}]", ids(&self.missing), ids(&self.unexpected))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("catalog lists id {0} twice")]
    DuplicateId(ItemId),
    #[error("key mismatch: fields {fields}; vectors {vectors}")]
    KeyMismatch { fields: KeyDiff, vectors: KeyDiff },
    #[error("failed to serialize dataset: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write dataset {0}: {1}")]
    Write(std::path::PathBuf, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FieldValue;

    fn record(i: usize) -> CatalogRecord {
        CatalogRecord {
            id: ItemId(i),
            category: format!("breed{}", i % 2),
            name: format!("brand{i}"),
            source_url: format!("http://example.jp/brand/{i}/"),
        }
    }

    fn fields(i: usize) -> ExtractedFields {
        ExtractedFields {
            review_text: FieldValue::Present("review".into()),
            description: FieldValue::Absent {
                reason: "none".into(),
            },
            characteristics: FieldValue::Present(format!("traits{i}")),
        }
    }

    fn inputs(n: usize) -> (Vec<CatalogRecord>, BTreeMap<ItemId, ExtractedFields>, BTreeMap<ItemId, Embedding>) {
        let records = (0..n).map(record).collect();
        let fields = (0..n).map(|i| (ItemId(i), fields(i))).collect();
        let vectors = (0..n).map(|i| (ItemId(i), vec![i as f32; 3])).collect();
        (records, fields, vectors)
    }

    #[test]
    fn full_join_has_one_row_per_record() {
        let (records, fields, vectors) = inputs(5);
        let rows = merge(&records, &fields, &vectors).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3].id, ItemId(3));
        assert_eq!(rows[3].characteristics, "traits3");
        assert_eq!(rows[3].vector, vec![3.0; 3]);
        assert_eq!(rows[3].source_url, "http://example.jp/brand/3/");
    }

    #[test]
    fn missing_fields_entry_fails() {
        let (records, mut fields, vectors) = inputs(5);
        fields.remove(&ItemId(2));
        match merge(&records, &fields, &vectors) {
            Err(MergeError::KeyMismatch { fields, vectors }) => {
                assert_eq!(fields.missing, vec![ItemId(2)]);
                assert!(vectors.is_empty());
            }
            other => panic!("expected key mismatch, got {other:?}"),
        }
    }

    #[test]
    fn extra_vector_fails() {
        let (records, fields, mut vectors) = inputs(2);
        vectors.insert(ItemId(9), vec![0.0; 3]);
        match merge(&records, &fields, &vectors) {
            Err(MergeError::KeyMismatch { vectors, .. }) => {
                assert_eq!(vectors.unexpected, vec![ItemId(9)]);
            }
            other => panic!("expected key mismatch, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_catalog_id_fails() {
        let (mut records, fields, vectors) = inputs(2);
        records.push(record(1));
        assert!(matches!(
            merge(&records, &fields, &vectors),
            Err(MergeError::DuplicateId(ItemId(1)))
        ));
    }

    #[test]
    fn absent_characteristics_merge_as_empty() {
        let (records, mut fields, vectors) = inputs(1);
        fields.get_mut(&ItemId(0)).unwrap().characteristics = FieldValue::Absent {
            reason: "no table".into(),
        };
        let rows = merge(&records, &fields, &vectors).unwrap();
        assert_eq!(rows[0].characteristics, "");
    }

    #[test]
    fn mismatch_message_lists_ids() {
        let diff = KeyDiff {
            missing: vec![ItemId(1), ItemId(12)],
            unexpected: vec![],
        };
        assert_eq!(diff.to_string(), "missing [001, 012], unexpected []");
    }

    #[test]
    fn writes_json_array() {
        let (records, fields, vectors) = inputs(2);
        let rows = merge(&records, &fields, &vectors).unwrap();
        let path = std::env::temp_dir().join(format!("recommend-merge-{}.json", std::process::id()));
        write_json(&path, &rows).unwrap();
        let back: Vec<MergedRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, rows);
        assert_eq!(back[1].id, ItemId(1));
    }
}
