//! Ingestion and search pipelines for the pixmem photo-memory indexer.
//!
//! A [`Collection`] is the session object for one mounted directory tree:
//! it owns the store connection, the vector index, the embedding provider,
//! and the enrichment collaborators, so multiple independent collections
//! can coexist in one process and tests need no global state.
//!
//! # Main types
//!
//! - [`Collection`] — Mounted directory: scan, search, record access.
//! - [`IngestReport`] — Added/skipped counts from one scan.
//! - [`SearchOptions`] — k, relevance cutoff, optional date bounds.
//! - [`TextExtractor`] — OCR collaborator seam ([`TesseractCli`], [`NoOcr`]).
//! - [`GeoResolver`] — Reverse-geocoding seam ([`NominatimResolver`], [`NoGeocode`]).

/// Content hashing for file identity.
pub mod hash;
/// Ingestion pipeline internals: walk, enrich, derive.
pub mod ingest;
/// EXIF and thumbnail collaborators.
pub mod media;
/// Reverse-geocoding collaborator seam.
pub mod geocode;
/// OCR collaborator seam.
pub mod ocr;
/// Search pipeline options and filtering.
pub mod search;
/// The mounted-collection session object.
pub mod session;

pub use geocode::{GeoResolver, NoGeocode, NominatimResolver};
pub use ingest::{IngestReport, SUPPORTED_EXTENSIONS};
pub use ocr::{NoOcr, TesseractCli, TextExtractor};
pub use search::{SearchOptions, DEFAULT_RELEVANCE_CUTOFF};
pub use session::Collection;
