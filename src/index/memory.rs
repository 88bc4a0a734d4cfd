//! In-process vector index held behind an async lock.

use super::types::{IndexEntry, IndexError, ScoredUnit};
use super::{VectorIndex, cosine_similarity};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Vector index backed by an in-memory map keyed by document identifier.
///
/// Suitable for single-process deployments and tests. Upserts replace the whole
/// document entry set atomically, so a cancelled run never leaves partial state
/// visible to queries for other documents.
#[derive(Default)]
pub struct MemoryIndex {
    documents: RwLock<HashMap<String, Vec<IndexEntry>>>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored for a document.
    pub async fn entry_count(&self, document_id: &str) -> usize {
        self.documents
            .read()
            .await
            .get(document_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let mut documents = self.documents.write().await;
        documents.insert(document_id.to_string(), entries);
        Ok(())
    }

    async fn query(
        &self,
        document_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredUnit>, IndexError> {
        let documents = self.documents.read().await;
        let Some(entries) = documents.get(document_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(f32, usize, &IndexEntry)> = entries
            .iter()
            .map(|entry| (cosine_similarity(&entry.vector, vector), entry.ordinal, entry))
            .collect();
        // Descending score, ascending ordinal on ties.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        Ok(scored
            .into_iter()
            .take(k.min(entries.len()))
            .map(|(score, _, entry)| ScoredUnit {
                unit_id: entry.unit_id.clone(),
                score,
            })
            .collect())
    }

    async fn delete(&self, document_id: &str) -> Result<(), IndexError> {
        let mut documents = self.documents.write().await;
        documents.remove(document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(unit_id: &str, ordinal: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            unit_id: unit_id.to_string(),
            ordinal,
            text: format!("text for {unit_id}"),
            source_field: "medication".into(),
            vector,
        }
    }

    #[tokio::test]
    async fn query_orders_by_similarity() {
        let index = MemoryIndex::new();
        index
            .upsert(
                "doc-a",
                vec![
                    entry("far", 0, vec![0.0, 1.0]),
                    entry("near", 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("doc-a", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].unit_id, "near");
        assert_eq!(hits[1].unit_id, "far");
    }

    #[tokio::test]
    async fn query_breaks_ties_by_insertion_order() {
        let index = MemoryIndex::new();
        index
            .upsert(
                "doc-a",
                vec![
                    entry("second", 1, vec![1.0, 0.0]),
                    entry("first", 0, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("doc-a", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].unit_id, "first");
        assert_eq!(hits[1].unit_id, "second");
    }

    #[tokio::test]
    async fn query_clamps_k_to_available_entries() {
        let index = MemoryIndex::new();
        index
            .upsert("doc-a", vec![entry("only", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = index.query("doc-a", &[1.0, 0.0], 8).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn query_never_crosses_document_boundaries() {
        let index = MemoryIndex::new();
        index
            .upsert("doc-a", vec![entry("a-unit", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("doc-b", vec![entry("b-unit", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = index.query("doc-a", &[1.0, 0.0], 8).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unit_id, "a-unit");
    }

    #[tokio::test]
    async fn query_on_unknown_document_returns_empty() {
        let index = MemoryIndex::new();
        let hits = index.query("missing", &[1.0], 4).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_document_entries() {
        let index = MemoryIndex::new();
        index
            .upsert("doc-a", vec![entry("unit", 0, vec![1.0])])
            .await
            .unwrap();
        index.delete("doc-a").await.unwrap();
        assert_eq!(index.entry_count("doc-a").await, 0);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_entries() {
        let index = MemoryIndex::new();
        index
            .upsert("doc-a", vec![entry("old", 0, vec![1.0])])
            .await
            .unwrap();
        index
            .upsert("doc-a", vec![entry("new", 0, vec![1.0])])
            .await
            .unwrap();

        let hits = index.query("doc-a", &[1.0], 8).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].unit_id, "new");
    }
}
