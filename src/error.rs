//! Failure taxonomy for a README generation run.
//!
//! Every variant wraps the underlying cause as an [`anyhow::Error`] so the
//! full context chain survives into the task report.

use thiserror::Error;

/// Pipeline stage an error was raised from.
///
/// Chunking cannot fail, so it has no stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Indexing,
    Composition,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Indexing => "indexing",
            Stage::Composition => "composition",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Clone failed: network, auth, missing branch, or timeout.
    #[error("failed to fetch repository {url}")]
    Fetch {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// The clone succeeded but no file matched the allowed extensions.
    #[error("no processable files found in repository {url}")]
    EmptyRepository { url: String },

    /// The vector store could not be reached or rejected a write.
    #[error("vector store operation failed for collection {collection}")]
    Index {
        collection: String,
        #[source]
        source: anyhow::Error,
    },

    /// The embedding model could not produce vectors.
    #[error("embedding model unavailable")]
    EmbeddingUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// The chat model refused or failed to produce a section.
    #[error("failed to compose section \"{section}\"")]
    Composition {
        section: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Stable kind label used in task failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch { .. } => "FetchError",
            PipelineError::EmptyRepository { .. } => "EmptyRepositoryError",
            PipelineError::Index { .. } => "IndexError",
            PipelineError::EmbeddingUnavailable { .. } => "EmbeddingUnavailableError",
            PipelineError::Composition { .. } => "CompositionError",
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch { .. } | PipelineError::EmptyRepository { .. } => Stage::Fetch,
            PipelineError::Index { .. } | PipelineError::EmbeddingUnavailable { .. } => {
                Stage::Indexing
            }
            PipelineError::Composition { .. } => Stage::Composition,
        }
    }
}
