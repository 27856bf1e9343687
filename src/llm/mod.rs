//! Language-model collaborators: embeddings, streaming chat, and section composition.

pub mod chat_stream;
pub mod compose;
pub mod embeddings;

pub use chat_stream::{ChatModel, ChatStream, HttpChatModel, SamplingParams};
pub use compose::SectionComposer;
pub use embeddings::{Embedder, HttpEmbedder};
