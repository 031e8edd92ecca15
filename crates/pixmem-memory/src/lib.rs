//! Persistent memory store, vector index, and embedding providers.
//!
//! One [`MemoryStore`] holds every indexed image for a mounted collection
//! (SQLite, one row per distinct content hash). The [`VectorIndex`] is an
//! in-process exact-scan mirror of all stored embeddings, rebuildable from
//! the store at any time; it is never itself a source of truth.
//!
//! # Main types
//!
//! - [`MemoryStore`] — SQLite-backed record and vision-config persistence.
//! - [`VectorIndex`] — Flat squared-L2 nearest-neighbor index.
//! - [`EmbeddingProvider`] — Trait for turning derived text into vectors.
//! - [`HashEmbedding`] — Deterministic local hashed bag-of-words embedding.
//! - [`OllamaEmbedding`] — Remote embedding via an Ollama endpoint.

/// Embedding provider trait and implementations.
pub mod embedding;
/// Exact-scan vector index over fixed-dimension embeddings.
pub mod index;
/// SQLite-backed persistent store for memory records.
pub mod store;

pub use embedding::{EmbeddingProvider, HashEmbedding, OllamaEmbedding};
pub use index::{IndexHit, VectorIndex};
pub use store::{DisplayRow, EmbeddingRow, MemoryStore};
