pub mod embedding;
pub mod qdrant_client;

pub use embedding::{cosine_similarity, EmbeddingProvider, HttpEmbeddingProvider};
pub use qdrant_client::QdrantLongTermMemory;
