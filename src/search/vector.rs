use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::VectorRecord;

/// A similarity match returned by a vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub text: String,
    pub source_path: String,
    pub score: f32,
}

/// Named collections of embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` empty, dropping any collection that already has that name.
    async fn create_or_replace_collection(&self, name: &str, dim: usize) -> Result<()>;

    /// Append records to an existing collection.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// The `k` records closest to `vector`, best first.
    async fn query_similar(&self, collection: &str, vector: &[f32], k: usize)
        -> Result<Vec<VectorHit>>;

    /// The job that indexed `name` is done with it. Stores that serve
    /// collections beyond a single job keep them.
    async fn release_collection(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct VectorEntry {
    text: String,
    source_path: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Default)]
struct Collection {
    dim: usize,
    entries: Vec<VectorEntry>,
}

/// In-process vector store with cosine similarity search.
///
/// Collections live only as long as the job that built them, unless the
/// store was made with [`MemoryVectorStore::retaining`].
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    retain: bool,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that keeps released collections, for inspecting them afterwards.
    pub fn retaining() -> Self {
        Self {
            retain: true,
            ..Self::default()
        }
    }

    /// Number of records in `collection`, or `None` if it does not exist.
    pub fn entry_count(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.entries.len())
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_or_replace_collection(&self, name: &str, dim: usize) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.remove(name).is_some() {
            tracing::info!("Replaced existing collection {name}");
        }
        collections.insert(
            name.to_string(),
            Collection {
                dim,
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("Collection {collection} does not exist"))?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != target.dim) {
            anyhow::bail!(
                "Vector of dimension {} does not fit collection {collection} (dimension {})",
                bad.embedding.len(),
                target.dim
            );
        }

        target.entries.extend(records.iter().map(|r| VectorEntry {
            text: r.text.clone(),
            source_path: r.source_path.clone(),
            embedding: r.embedding.clone(),
        }));
        Ok(())
    }

    async fn query_similar(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| anyhow::anyhow!("Collection {collection} does not exist"))?;

        let mut scored: Vec<(f32, &VectorEntry)> = target
            .entries
            .iter()
            .map(|e| (cosine_similarity(vector, &e.embedding), e))
            .collect();

        // Stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                text: e.text.clone(),
                source_path: e.source_path.clone(),
                score,
            })
            .collect())
    }

    async fn release_collection(&self, name: &str) -> Result<()> {
        if !self.retain && self.collections.write().remove(name).is_some() {
            tracing::debug!("Dropped collection {name}");
        }
        Ok(())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
