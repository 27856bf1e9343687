//! README generation: fetch, chunk, index, then compose each section.
//!
//! ```text
//! START → FETCHED → CHUNKED → INDEXED → COMPOSING_SECTION[i]* → CLEANED_UP → DONE
//!    └────────┴─────────┴─────────┴──────────────┴─────────→ FAILED
//! ```

use futures_util::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::chunking::chunk_documents;
use crate::config::Config;
use crate::error::PipelineError;
use crate::git::{fetch_repository, FetchOptions, ScratchDir};
use crate::llm::{ChatModel, Embedder, SectionComposer};
use crate::models::{RepoJob, Section, SectionResult};
use crate::search::{EmbeddingIndexer, Retriever, VectorStore};

/// Appended to a section whose model stream broke off.
pub const TRUNCATION_NOTICE: &str =
    "> **Note:** generation of this section was interrupted; the text above is incomplete.";

pub struct ReadmeGenerator {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    indexer: EmbeddingIndexer,
    composer: SectionComposer,
    /// One lock per collection so same-repo jobs never overlap
    identity_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReadmeGenerator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        let indexer = EmbeddingIndexer::new(
            store.clone(),
            embedder,
            config.vector_store.upsert_batch_size,
            config.vector_store.top_k,
        );
        let idle_timeout = match config.llm.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            store,
            indexer,
            composer: SectionComposer::new(chat, idle_timeout),
            identity_locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Run the whole pipeline for one repository.
    ///
    /// Jobs for the same collection wait for each other. The scratch
    /// directory is gone by the time this returns, whatever the outcome.
    pub async fn generate_readme(&self, job: &RepoJob) -> Result<String, PipelineError> {
        let lock = self.identity_lock(&job.collection);
        let result = {
            let _held = lock.lock().await;
            let result = self.run(job).await;
            if let Err(e) = self.store.release_collection(&job.collection).await {
                tracing::warn!("Failed to release collection {}: {e:#}", job.collection);
            }
            result
        };
        self.release_identity_lock(&job.collection, lock);
        result
    }

    async fn run(&self, job: &RepoJob) -> Result<String, PipelineError> {
        let scratch = ScratchDir::acquire(&self.config.scratch_dir, &job.collection).map_err(
            |e| PipelineError::Fetch {
                url: job.url.clone(),
                source: anyhow::Error::new(e).context("Failed to prepare scratch directory"),
            },
        )?;

        tracing::info!("Generating README for {} (collection {})", job.url, job.collection);
        let documents = fetch_repository(&job.url, &scratch, &self.fetch_options()).await?;
        tracing::info!("Fetched {} documents from {}", documents.len(), job.url);

        let chunks = chunk_documents(&documents);
        if chunks.is_empty() {
            tracing::warn!("Every document in {} is blank; sections get no context", job.url);
        }
        tracing::info!("Split {} documents into {} chunks", documents.len(), chunks.len());

        let retriever = self.indexer.index(&chunks, &job.collection).await?;
        tracing::info!("Indexed collection {}", job.collection);

        let sections: Vec<SectionResult> = stream::iter(Section::ALL)
            .map(|section| self.compose_section(&retriever, section))
            .buffered(self.config.section_concurrency.max(1))
            .try_collect()
            .await?;

        drop(scratch);
        tracing::info!("Cleaned up scratch directory for {}", job.collection);

        Ok(assemble_readme(&sections))
    }

    async fn compose_section(
        &self,
        retriever: &Retriever,
        section: Section,
    ) -> Result<SectionResult, PipelineError> {
        let name = section.name();
        tracing::info!("Generating section: '{name}'");

        let context = retriever
            .context_for(name)
            .await
            .map_err(|source| PipelineError::Composition {
                section: name.to_string(),
                source: source.context("Failed to retrieve context"),
            })?;

        self.composer.compose(section, &context).await
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            branch: self.config.branch.clone(),
            git_token: self.config.git_token.clone(),
            timeout: Some(Duration::from_secs(self.config.clone_timeout_secs)),
        }
    }

    fn identity_lock(&self, collection: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.identity_locks
            .lock()
            .entry(collection.to_string())
            .or_default()
            .clone()
    }

    fn release_identity_lock(&self, collection: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.identity_locks.lock();
        drop(lock);
        // Only the map's own handle left means nobody is waiting
        if locks
            .get(collection)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(collection);
        }
    }

    #[cfg(test)]
    fn tracked_identities(&self) -> usize {
        self.identity_locks.lock().len()
    }
}

/// Join sections in order, separated by blank lines.
///
/// A section gets a `## <name>` heading unless the model already opened
/// with one.
pub fn assemble_readme(sections: &[SectionResult]) -> String {
    sections
        .iter()
        .map(render_section)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_section(result: &SectionResult) -> String {
    let body = result.markdown.trim();
    let mut out = if body.starts_with('#') {
        body.to_string()
    } else if body.is_empty() {
        format!("## {}", result.section.name())
    } else {
        format!("## {}\n\n{body}", result.section.name())
    };

    if result.truncated {
        out.push_str("\n\n");
        out.push_str(TRUNCATION_NOTICE);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatStream;
    use crate::llm::SamplingParams;
    use crate::search::MemoryVectorStore;
    use async_trait::async_trait;

    fn section(section: Section, markdown: &str, truncated: bool) -> SectionResult {
        SectionResult {
            section,
            markdown: markdown.to_string(),
            truncated,
        }
    }

    #[test]
    fn test_assemble_adds_headings_in_order() {
        let readme = assemble_readme(&[
            section(Section::Overview, "A widget factory.", false),
            section(Section::KeyFeatures, "- fast", false),
            section(Section::Installation, "pip install widget", false),
            section(Section::Usage, "widget run", false),
        ]);

        assert_eq!(
            readme,
            "## Project Title and Overview\n\nA widget factory.\n\n\
             ## Key Features\n\n- fast\n\n\
             ## Installation Instructions\n\npip install widget\n\n\
             ## Usage Guide\n\nwidget run"
        );
    }

    #[test]
    fn test_assemble_keeps_model_heading() {
        let readme = assemble_readme(&[section(Section::Overview, "# Widget\n\nTools.", false)]);
        assert_eq!(readme, "# Widget\n\nTools.");
    }

    #[test]
    fn test_assemble_marks_truncated_section() {
        let readme = assemble_readme(&[
            section(Section::Installation, "Install with", true),
            section(Section::Usage, "Run it", false),
        ]);
        let (first, second) = readme.split_once("## Usage Guide").unwrap();
        assert!(first.contains("Install with\n\n> **Note:**"));
        assert!(!second.contains("> **Note:**"));
    }

    #[test]
    fn test_assemble_empty_section_is_just_a_heading() {
        assert_eq!(
            assemble_readme(&[section(Section::Usage, "  \n", false)]),
            "## Usage Guide"
        );
    }

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        fn dimension(&self) -> usize {
            1
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct NullChat;

    #[async_trait]
    impl ChatModel for NullChat {
        async fn stream_chat(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _params: SamplingParams,
        ) -> anyhow::Result<ChatStream> {
            Ok(Box::pin(stream::empty::<anyhow::Result<String>>()))
        }
    }

    #[tokio::test]
    async fn test_identity_locks_are_released() {
        let generator = ReadmeGenerator::new(
            Arc::new(Config::default()),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(NullEmbedder),
            Arc::new(NullChat),
        );

        let lock = generator.identity_lock("acme_widget");
        assert_eq!(generator.tracked_identities(), 1);
        generator.release_identity_lock("acme_widget", lock);
        assert_eq!(generator.tracked_identities(), 0);
    }

    #[tokio::test]
    async fn test_identity_lock_survives_while_shared() {
        let generator = ReadmeGenerator::new(
            Arc::new(Config::default()),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(NullEmbedder),
            Arc::new(NullChat),
        );

        let first = generator.identity_lock("acme_widget");
        let second = generator.identity_lock("acme_widget");
        assert!(Arc::ptr_eq(&first, &second));

        generator.release_identity_lock("acme_widget", first);
        assert_eq!(generator.tracked_identities(), 1);
        generator.release_identity_lock("acme_widget", second);
        assert_eq!(generator.tracked_identities(), 0);
    }
}
