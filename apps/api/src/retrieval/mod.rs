//! Retrieval and caching engine.
//! One VectorIndex abstraction serves two owners: the static knowledge corpus
//! (KnowledgeRetriever) and the growing roadmap cache (GenerationCache).
//! Each index is constructed once in main and owned by exactly one of them.

pub mod cache;
pub mod embedding;
pub mod index;
pub mod knowledge;
pub mod memory;
pub mod postgres;

pub use cache::GenerationCache;
pub use index::{IndexError, VectorIndex};
pub use knowledge::KnowledgeRetriever;
