use std::sync::Arc;

use super::retriever::Retriever;
use super::vector::VectorStore;
use crate::error::PipelineError;
use crate::llm::Embedder;
use crate::models::{Chunk, VectorRecord};

/// Embeds chunks and writes them into a freshly created collection.
#[derive(Clone)]
pub struct EmbeddingIndexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    top_k: usize,
}

impl EmbeddingIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
            top_k,
        }
    }

    /// Embed every chunk, replace `collection`, and upsert the records.
    ///
    /// All embeddings are computed before the collection is touched, so an
    /// unavailable embedding model leaves any previous collection intact.
    pub async fn index(
        &self,
        chunks: &[Chunk],
        collection: &str,
    ) -> Result<Retriever, PipelineError> {
        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|source| PipelineError::EmbeddingUnavailable { source })?;

            records.extend(batch.iter().zip(vectors).map(|(chunk, embedding)| VectorRecord {
                text: chunk.text.clone(),
                source_path: chunk.source_path.clone(),
                embedding,
            }));
        }
        tracing::info!("Embedded {} chunks for {collection}", records.len());

        let index_err = |source: anyhow::Error| PipelineError::Index {
            collection: collection.to_string(),
            source,
        };

        self.store
            .create_or_replace_collection(collection, self.embedder.dimension())
            .await
            .map_err(index_err)?;

        for batch in records.chunks(self.batch_size) {
            self.store.upsert(collection, batch).await.map_err(index_err)?;
        }
        tracing::info!("Indexed {} points into {collection}", records.len());

        Ok(Retriever::new(
            self.store.clone(),
            self.embedder.clone(),
            collection,
            self.top_k,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MemoryVectorStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct CountingEmbedder {
        calls: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.lock().push(texts.len());
            if self.fail {
                anyhow::bail!("Failed to call Ollama embed API");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.0]).collect())
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                text: format!("chunk number {i}"),
                source_path: "README.md".to_string(),
                chunk_index: i,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_index_embeds_in_batches() {
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(CountingEmbedder::new(false));
        let indexer = EmbeddingIndexer::new(store.clone(), embedder.clone(), 2, 4);

        let retriever = indexer.index(&chunks(5), "acme_widget").await.unwrap();
        assert_eq!(retriever.collection(), "acme_widget");
        assert_eq!(*embedder.calls.lock(), vec![2, 2, 1]);
        assert_eq!(store.entry_count("acme_widget"), Some(5));
    }

    #[tokio::test]
    async fn test_reindexing_leaves_one_set_of_vectors() {
        let store = Arc::new(MemoryVectorStore::new());
        let indexer =
            EmbeddingIndexer::new(store.clone(), Arc::new(CountingEmbedder::new(false)), 64, 4);

        indexer.index(&chunks(3), "acme_widget").await.unwrap();
        indexer.index(&chunks(3), "acme_widget").await.unwrap();
        assert_eq!(store.entry_count("acme_widget"), Some(3));
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_previous_collection() {
        let store = Arc::new(MemoryVectorStore::new());
        EmbeddingIndexer::new(store.clone(), Arc::new(CountingEmbedder::new(false)), 64, 4)
            .index(&chunks(2), "acme_widget")
            .await
            .unwrap();

        let err = EmbeddingIndexer::new(store.clone(), Arc::new(CountingEmbedder::new(true)), 64, 4)
            .index(&chunks(2), "acme_widget")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "EmbeddingUnavailableError");
        assert_eq!(store.entry_count("acme_widget"), Some(2));
    }
}
