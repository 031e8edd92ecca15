//! Core types and error definitions for the pixmem photo-memory indexer.
//!
//! This crate provides the foundational types shared across all pixmem crates:
//! the persistent record shape, vision configuration, search results, and the
//! unified error taxonomy.
//!
//! # Main types
//!
//! - [`PixmemError`] — Unified error enum for all pixmem subsystems.
//! - [`PixmemResult`] — Convenience alias for `Result<T, PixmemError>`.
//! - [`MemoryRecord`] — One indexed image: metadata, derived text, embedding.
//! - [`VisionStatus`] — Outcome of the vision enrichment step for a record.
//! - [`VisionConfig`] — The persisted vision backend configuration.
//! - [`SearchHit`] — A single ranked search result.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the pixmem indexer.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum PixmemError {
    /// An error from the persistent memory store (SQLite).
    #[error("Store error: {0}")]
    Store(String),

    /// An error from the in-memory vector index.
    #[error("Index error: {0}")]
    Index(String),

    /// An error from the vision vendor layer (detection, inference, contract).
    #[error("Vision error: {0}")]
    Vision(String),

    /// An error from the embedding provider.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A precondition failure: an operation was requested against a
    /// collection state that cannot serve it (no store, no index).
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`PixmemError`].
pub type PixmemResult<T> = Result<T, PixmemError>;

// --- Record types ---

/// Embedding dimension used when no provider overrides it. Fixed for the
/// lifetime of a mounted collection; changing it invalidates stored vectors.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Outcome of the vision enrichment step for a [`MemoryRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionStatus {
    /// Vision analysis has not been attempted yet.
    Pending,
    /// A vendor response was received and passed contract validation.
    Success,
    /// The vendor call or contract validation failed; record kept with
    /// OCR/filename fallbacks. Distinguishable from `Pending` so a retry
    /// policy can be layered on later.
    Failed,
}

impl VisionStatus {
    /// The stable string form persisted in the store.
    pub fn as_str(self) -> &'static str {
        match self {
            VisionStatus::Pending => "pending",
            VisionStatus::Success => "success",
            VisionStatus::Failed => "failed",
        }
    }

    /// Parses the persisted string form. Unknown or absent values read as
    /// `Pending` (additive compatibility with older rows).
    pub fn parse(s: Option<&str>) -> Self {
        match s {
            Some("success") => VisionStatus::Success,
            Some("failed") => VisionStatus::Failed,
            _ => VisionStatus::Pending,
        }
    }
}

/// One indexed image: identity, metadata, derived text, embedding, preview.
///
/// Exactly one record exists per distinct content `hash`. Re-encountering
/// the same hash under a different path is a path update, not a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque stable identifier, generated once per distinct content hash.
    pub file_id: Uuid,
    /// Last-known filesystem location. May go stale; not part of identity.
    pub path: String,
    /// SHA-256 hex digest of the file bytes. The dedup key.
    pub hash: String,
    /// Filesystem creation time (or modification time where unavailable).
    pub created_at: DateTime<Utc>,
    /// Filesystem modification time at last indexing.
    pub modified_at: DateTime<Utc>,
    /// EXIF capture date when present and parseable, else `None`.
    pub exif_date: Option<NaiveDateTime>,
    /// Raw OCR text extracted from the image. Empty when OCR failed or
    /// found nothing.
    pub ocr_text: String,
    /// Short caption, currently derived from the filename.
    pub caption: String,
    /// One-line summary used for display and embedding.
    pub memory_summary: String,
    /// Comma-delimited tag string derived from vision output or a fallback
    /// sentinel.
    pub tags: String,
    /// Raw vision contract output as JSON text, when vision succeeded.
    pub vision_json: Option<String>,
    /// Outcome of the vision enrichment step.
    pub vision_status: VisionStatus,
    /// Semantic embedding of the derived text. Always written together with
    /// the record; all-zero when the embedding provider failed.
    pub embedding: Vec<f32>,
    /// Small re-encoded JPEG preview. Derived, never authoritative.
    pub thumbnail: Vec<u8>,
}

/// Persisted vision backend configuration (singleton).
///
/// Mutated only through the validate-then-save gate: a configuration is
/// persisted only after one real inference call against a known-good test
/// image produced a contract-valid response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the vision inference endpoint.
    pub endpoint: String,
    /// Optional bearer token for the endpoint.
    pub api_key: Option<String>,
    /// Detected vendor kind (e.g. "ollama", "openai"), set at validation.
    pub vendor: Option<String>,
    /// Model identifier to use for inference.
    pub model: String,
    /// When this configuration last passed the validation gate.
    pub last_validated_at: Option<DateTime<Utc>>,
}

// --- Search types ---

/// A single ranked search result, joined back to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Identifier of the matching record.
    pub file_id: Uuid,
    /// Last-known path of the matching file.
    pub path: String,
    /// Squared L2 distance between query and record embeddings. Smaller is
    /// more similar.
    pub distance: f32,
    /// Display summary of the record.
    pub summary: String,
    /// Tag string of the record.
    pub tags: String,
    /// Vision enrichment outcome for the record.
    pub vision_status: VisionStatus,
    /// EXIF capture date, when known.
    pub exif_date: Option<NaiveDateTime>,
    /// JPEG thumbnail rendered as a `data:image/jpeg;base64,` URI.
    pub thumbnail_b64: Option<String>,
}
