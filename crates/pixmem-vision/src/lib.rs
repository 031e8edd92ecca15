//! Vision vendor abstraction for the pixmem indexer.
//!
//! Interchangeable local vision-inference backends (Ollama, any
//! OpenAI-compatible server) sit behind one adapter with a fixed
//! capability set: list models, analyze an image into a validated
//! [`VisionContract`], and best-effort query expansion. The backend kind
//! is detected once at adapter construction, never per call.
//!
//! # Main types
//!
//! - [`VisionContract`] — The JSON shape every vendor response must satisfy.
//! - [`VisionVendor`] — Trait implemented by each backend kind.
//! - [`VisionAdapter`] — Detection, dispatch, and the validate-then-save gate.
//! - [`VendorKind`] — The two supported backend kinds.

/// Required output shape for vendor responses.
pub mod contract;
/// Vendor detection and dispatch.
pub mod adapter;
/// Concrete vendor backends.
pub mod vendors;

pub use adapter::{VendorKind, VisionAdapter};
pub use contract::VisionContract;
pub use vendors::VisionVendor;
