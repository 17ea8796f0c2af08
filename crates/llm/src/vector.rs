//! Vector store capability for the RAG knowledge base.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ward_domain::Result;

/// A retrieved knowledge reference with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRef {
    pub id: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: serde_json::Value) -> Result<()>;
    /// Top-k entries by cosine similarity, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<KnowledgeRef>>;
}

/// Cosine similarity between two vectors. Returns `0.0` for mismatched
/// lengths or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine_similarity: mismatched vector lengths, returning 0.0"
        );
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

struct Entry {
    vector: Vec<f32>,
    metadata: serde_json::Value,
}

/// Brute-force in-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(String, Entry)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.write();
        let entry = Entry { vector, metadata };
        if let Some(slot) = entries.iter_mut().find(|(eid, _)| eid == id) {
            slot.1 = entry;
        } else {
            entries.push((id.to_owned(), entry));
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<KnowledgeRef>> {
        let entries = self.entries.read();
        let mut scored: Vec<KnowledgeRef> = entries
            .iter()
            .map(|(id, entry)| KnowledgeRef {
                id: id.clone(),
                score: cosine_similarity(vector, &entry.vector),
                metadata: entry.metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert("close", vec![1.0, 0.0], serde_json::json!({"t": "a"}))
            .await
            .unwrap();
        store
            .upsert("far", vec![0.0, 1.0], serde_json::json!({"t": "b"}))
            .await
            .unwrap();

        let hits = store.query(&[0.9, 0.1], 2).await.unwrap();
        assert_eq!(hits[0].id, "close");
        assert_eq!(hits[1].id, "far");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let store = InMemoryVectorStore::new();
        store
            .upsert("doc", vec![1.0, 0.0], serde_json::json!({}))
            .await
            .unwrap();
        store
            .upsert("doc", vec![0.0, 1.0], serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        let hits = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}
