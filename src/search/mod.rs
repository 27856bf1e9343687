pub mod index;
pub mod qdrant;
pub mod retriever;
pub mod vector;

pub use index::EmbeddingIndexer;
pub use qdrant::QdrantStore;
pub use retriever::Retriever;
pub use vector::{MemoryVectorStore, VectorHit, VectorStore};
