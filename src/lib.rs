//! # readme-forge
//!
//! Generates a README for a git repository as a background job. Each job
//! clones the repository, chunks its text files, embeds the chunks into a
//! per-repository vector collection, and streams one LLM completion per
//! README section using the closest chunks as context.
//!
//! ## Architecture
//!
//! ```text
//!   POST /generate ──► JobQueue ──► task::run_readme_task
//!                                        │
//!                                        ▼
//!                               pipeline::ReadmeGenerator
//!                                        │
//!        ┌──────────────┬────────────────┼─────────────────┐
//!        ▼              ▼                ▼                 ▼
//!   git::fetch     chunking::      search::Embedding   per section:
//!   (scratch dir)  chunk_documents   Indexer           Retriever → SectionComposer
//!                                                          │
//!                                                          ▼
//!                                         assemble_readme → job result
//!
//!   GET /status/{task_id} ◄── JobQueue::status
//! ```
//!
//! Failures never escape a job: [`task::into_task_output`] turns them into
//! a `TASK FAILED:` report stored as the job's result.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment configuration, validated at startup
//! - [`models`] - Jobs, documents, chunks, sections, and HTTP payloads
//! - [`error`] - Pipeline failure taxonomy
//! - [`git`] - Cloning into a scratch directory and collecting text files
//! - [`chunking`] - Overlapping character windows cut at line and word breaks
//! - [`llm::embeddings`] - Batch embeddings via Ollama or OpenAI-compatible APIs
//! - [`llm::chat_stream`] - Streaming chat completions
//! - [`llm::compose`] - Per-section prompting and stream accumulation
//! - [`search`] - Vector stores (in-memory and Qdrant), indexing, and retrieval
//! - [`pipeline`] - The README generation run
//! - [`task`] - Failure capture at the job boundary
//! - [`jobs`] - Bounded background job queue with result retention
//! - [`api`] - Axum handlers for submission and polling

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod git;
pub mod jobs;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod state;
pub mod task;
