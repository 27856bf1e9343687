use anyhow::{Context, Result};
use std::sync::Arc;

use super::vector::{VectorHit, VectorStore};
use crate::llm::Embedder;

/// Handle onto one indexed collection.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    k: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            k,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Top-k chunks for `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<VectorHit>> {
        let mut vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .context("Failed to embed retrieval query")?;
        let vector = vectors
            .pop()
            .context("Embedder returned no vector for the retrieval query")?;

        let hits = self
            .store
            .query_similar(&self.collection, &vector, self.k)
            .await
            .with_context(|| format!("Failed to query collection {}", self.collection))?;

        tracing::debug!(
            "Retrieved {} chunks for '{query}' from {}",
            hits.len(),
            self.collection
        );
        Ok(hits)
    }

    /// Retrieved chunk texts joined by blank lines.
    pub async fn context_for(&self, query: &str) -> Result<String> {
        let hits = self.retrieve(query).await?;
        Ok(join_context(&hits))
    }
}

pub fn join_context(hits: &[VectorHit]) -> String {
    hits.iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
