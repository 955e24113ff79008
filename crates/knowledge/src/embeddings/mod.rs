//! Embedding providers used to index and query documents.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
