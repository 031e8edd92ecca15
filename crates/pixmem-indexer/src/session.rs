use crate::geocode::GeoResolver;
use crate::hash::hash_file;
use crate::ingest::{
    collect_files, embedding_text, fallback_summary, vision_tags, IngestReport, TAGS_FALLBACK,
};
use crate::media::{file_times, read_exif, thumbnail_bytes};
use crate::ocr::TextExtractor;
use crate::search::{date_in_range, SearchOptions, MIN_EXPANDED_CHARS};
use base64::Engine as _;
use chrono::{NaiveDateTime, Utc};
use futures_util::stream::{self, StreamExt};
use pixmem_core::{
    MemoryRecord, PixmemError, PixmemResult, SearchHit, VisionConfig, VisionStatus,
};
use pixmem_memory::{EmbeddingProvider, MemoryStore, VectorIndex};
use pixmem_vision::{VendorKind, VisionAdapter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Database file kept inside the mounted directory.
const DB_FILE_NAME: &str = ".pixmem.db";

/// Bound on concurrently in-flight per-file enrichment (vision calls,
/// OCR subprocesses). Store writes stay serialized on the driving task.
const SCAN_CONCURRENCY: usize = 4;

struct VisionHandle {
    adapter: Arc<VisionAdapter>,
    model: String,
}

enum FileOutcome {
    Skipped,
    Ready(Box<MemoryRecord>),
}

/// One mounted photo collection: the session object owning the store
/// connection, the vector index, the embedding provider, and the
/// enrichment collaborators.
///
/// Everything an operation needs travels through this handle, so several
/// independent collections can coexist in one process. One scan runs at a
/// time per collection; searches are consistent once a scan has finished.
pub struct Collection {
    root: PathBuf,
    store: Arc<MemoryStore>,
    index: RwLock<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    ocr: Arc<dyn TextExtractor>,
    geo: Arc<dyn GeoResolver>,
    vision: Option<VisionHandle>,
}

impl Collection {
    /// Mounts a directory: opens (or creates) its database, binds the
    /// vision adapter when a validated configuration exists, and rebuilds
    /// the vector index from the store.
    pub async fn mount(
        root: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
        ocr: Arc<dyn TextExtractor>,
        geo: Arc<dyn GeoResolver>,
    ) -> PixmemResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PixmemError::Precondition(format!(
                "{} does not exist or is not a directory",
                root.display()
            )));
        }

        let store = Arc::new(MemoryStore::open(&root.join(DB_FILE_NAME))?);
        let vision = match store.vision_config()? {
            Some(config) => bind_vision(&config).await,
            None => None,
        };

        let mut index = VectorIndex::new(embedder.dimension());
        let indexed = index.rebuild_from_store(&store)?;
        info!(root = %root.display(), indexed, "collection mounted");

        Ok(Self {
            root,
            store,
            index: RwLock::new(index),
            embedder,
            ocr,
            geo,
            vision,
        })
    }

    /// The mounted directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of records in the store.
    pub fn count(&self) -> PixmemResult<u64> {
        self.store.count()
    }

    /// Fetches a full record by identifier.
    pub fn record(&self, file_id: Uuid) -> PixmemResult<Option<MemoryRecord>> {
        self.store.get(file_id)
    }

    /// Fetches the thumbnail bytes of a record.
    pub fn thumbnail(&self, file_id: Uuid) -> PixmemResult<Option<Vec<u8>>> {
        self.store.thumbnail(file_id)
    }

    /// Drops the vision handle for this session; enrichment falls back to
    /// OCR and filenames. The persisted configuration is untouched.
    pub fn disable_vision(&mut self) {
        self.vision = None;
    }

    /// Rebuilds the vector index wholesale from the store and returns the
    /// number of indexed vectors. Always safe; used whenever index
    /// consistency is in doubt.
    pub async fn rebuild_index(&self) -> PixmemResult<usize> {
        self.index.write().await.rebuild_from_store(&self.store)
    }

    /// Scans the mounted tree, ingesting every supported image.
    ///
    /// Per file: hash, dedup probe, EXIF timestamps and GPS, optional
    /// geocoding and vision enrichment, OCR, summary/tag derivation,
    /// embedding, thumbnail, atomic upsert, incremental index add. A
    /// failure in any one file never aborts the batch. With `rebuild`,
    /// known hashes are re-enriched in place, keeping their `file_id`.
    pub async fn scan(&self, rebuild: bool) -> PixmemResult<IngestReport> {
        let files = collect_files(&self.root);
        info!(files = files.len(), rebuild, "scan started");

        let mut report = IngestReport::default();
        let mut index = self.index.write().await;

        {
            let mut outcomes = stream::iter(files)
                .map(|path| self.process_file(path, rebuild))
                .buffer_unordered(SCAN_CONCURRENCY);

            while let Some(outcome) = outcomes.next().await {
                match outcome? {
                    FileOutcome::Skipped => report.skipped += 1,
                    FileOutcome::Ready(record) => {
                        let mut record = *record;
                        // Re-probe on the serialized write path: a duplicate
                        // inside this batch may have landed while this file
                        // was in flight.
                        match self.store.find_by_hash(&record.hash)? {
                            Some((existing, _)) if !rebuild => {
                                self.store.update_path(
                                    existing,
                                    &record.path,
                                    record.modified_at,
                                )?;
                                report.skipped += 1;
                            }
                            Some((existing, _)) => {
                                record.file_id = existing;
                                self.store.upsert(&record)?;
                                report.added += 1;
                            }
                            None => {
                                self.store.upsert(&record)?;
                                index.add(
                                    record.embedding.clone(),
                                    record.file_id,
                                    record.path.clone(),
                                )?;
                                report.added += 1;
                            }
                        }
                    }
                }
            }
        }

        if rebuild {
            // In-place rewrites do not append cleanly; replace wholesale.
            index.rebuild_from_store(&self.store)?;
        }

        info!(added = report.added, skipped = report.skipped, "scan finished");
        Ok(report)
    }

    async fn process_file(&self, path: PathBuf, rebuild: bool) -> PixmemResult<FileOutcome> {
        let hash = match hash_file(&path) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "unreadable file skipped");
                return Ok(FileOutcome::Skipped);
            }
        };
        let path_str = path.display().to_string();
        let (created_at, modified_at) = file_times(&path);

        if !rebuild {
            if let Some((existing, known_path)) = self.store.find_by_hash(&hash)? {
                if known_path != path_str {
                    debug!(path = %path_str, "known content at a new path");
                    self.store.update_path(existing, &path_str, modified_at)?;
                }
                return Ok(FileOutcome::Skipped);
            }
        }

        let exif = read_exif(&path);
        let location = match exif.gps {
            Some((lat, lon)) => self.geo.resolve(lat, lon).await,
            None => None,
        };

        let mut vision_status = VisionStatus::Pending;
        let mut vision_json = None;
        let mut contract = None;
        if let Some(vision) = &self.vision {
            vision_status = VisionStatus::Failed;
            let context = photo_context(location.as_deref(), exif.capture_date);
            match tokio::fs::read(&path).await {
                Ok(bytes) => match vision
                    .adapter
                    .predict(&vision.model, &bytes, context.as_deref())
                    .await
                {
                    Ok(output) => {
                        vision_status = VisionStatus::Success;
                        vision_json = serde_json::to_string(&output).ok();
                        contract = Some(output);
                    }
                    Err(e) => {
                        debug!(path = %path_str, error = %e, "vision enrichment failed");
                    }
                },
                Err(e) => {
                    debug!(path = %path_str, error = %e, "could not read image for vision");
                }
            }
        }

        // OCR always runs as a baseline signal, whatever vision did.
        let ocr_text = self.ocr.extract(&path).await;
        let filename = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (summary, tags) = match &contract {
            Some(c) => (c.summary.clone(), vision_tags(c, location.as_deref())),
            None => (
                fallback_summary(&ocr_text, &filename),
                TAGS_FALLBACK.to_string(),
            ),
        };

        let text = embedding_text(&summary, &tags, &ocr_text);
        let embedding = match self.embedder.embed(&text).await {
            Ok(vector) => vector,
            Err(e) => {
                debug!(path = %path_str, error = %e, "embedding failed, storing zero vector");
                vec![0.0; self.embedder.dimension()]
            }
        };
        let thumbnail = thumbnail_bytes(&path);

        Ok(FileOutcome::Ready(Box::new(MemoryRecord {
            file_id: Uuid::new_v4(),
            path: path_str,
            hash,
            created_at,
            modified_at,
            exif_date: exif.capture_date,
            ocr_text,
            caption: filename,
            memory_summary: summary,
            tags,
            vision_json,
            vision_status,
            embedding,
            thumbnail,
        })))
    }

    /// Searches the collection by natural-language query.
    ///
    /// Optionally rewrites the query through the vision backend, embeds it
    /// with the collection's provider, pulls `k` candidates from the
    /// index, drops everything past the relevance cutoff, joins survivors
    /// back to the store, and applies the inclusive date filter. Results
    /// come back in ascending-distance order.
    pub async fn search(&self, query: &str, opts: &SearchOptions) -> PixmemResult<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(PixmemError::Precondition("search query is empty".into()));
        }

        let mut text = query.to_string();
        if let Some(vision) = &self.vision {
            let expanded = vision.adapter.expand_query(&vision.model, query).await;
            let trimmed = expanded.trim();
            let expanded_chars = trimmed.chars().count();
            if expanded_chars >= MIN_EXPANDED_CHARS
                && expanded_chars > query.trim().chars().count()
            {
                debug!(original = %query, expanded = %trimmed, "query expanded");
                text = trimmed.to_string();
            }
        }

        let query_vec = self.embedder.embed(&text).await?;
        let candidates = {
            let index = self.index.read().await;
            index.search(&query_vec, opts.k)
        };

        let mut hits = Vec::new();
        for candidate in candidates {
            if candidate.distance > opts.max_distance {
                continue;
            }
            let Some(row) = self.store.display(candidate.file_id)? else {
                continue;
            };
            if !date_in_range(row.exif_date, opts.date_from, opts.date_to) {
                continue;
            }
            hits.push(SearchHit {
                file_id: row.file_id,
                path: row.path,
                distance: candidate.distance,
                summary: row.memory_summary,
                tags: row.tags,
                vision_status: row.vision_status,
                exif_date: row.exif_date,
                thumbnail_b64: row.thumbnail.map(|bytes| {
                    format!(
                        "data:image/jpeg;base64,{}",
                        base64::engine::general_purpose::STANDARD.encode(bytes)
                    )
                }),
            });
        }
        Ok(hits)
    }

    /// The persisted vision configuration, when one exists.
    pub fn vision_config(&self) -> PixmemResult<Option<VisionConfig>> {
        self.store.vision_config()
    }

    /// Lists vision-capable models at the configured endpoint. No vision
    /// configured means an empty list.
    pub async fn vision_models(&self) -> PixmemResult<Vec<String>> {
        match &self.vision {
            Some(vision) => vision.adapter.list_models().await,
            None => Ok(Vec::new()),
        }
    }

    /// Validate-then-save gate for the vision configuration.
    ///
    /// Detects the backend kind, runs one real inference against the
    /// known-good test image, and persists the configuration only when
    /// the response passed contract validation. On rejection the
    /// previously saved configuration stays in effect.
    pub async fn configure_vision(
        &mut self,
        endpoint: &str,
        api_key: Option<String>,
        model: &str,
    ) -> PixmemResult<VisionConfig> {
        let adapter = VisionAdapter::detect(endpoint, api_key.clone()).await;
        let Some(kind) = adapter.kind() else {
            return Err(PixmemError::Vision(format!(
                "no compatible vision backend detected at {endpoint}"
            )));
        };

        adapter
            .validate_model(model)
            .await
            .map_err(|e| PixmemError::Config(format!("vision configuration rejected: {e}")))?;

        let config = VisionConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            vendor: Some(kind.as_str().to_string()),
            model: model.to_string(),
            last_validated_at: Some(Utc::now()),
        };
        self.store.save_vision_config(&config)?;
        self.vision = Some(VisionHandle {
            adapter: Arc::new(adapter),
            model: model.to_string(),
        });
        info!(endpoint, model, vendor = kind.as_str(), "vision configuration validated and saved");
        Ok(config)
    }
}

/// Auxiliary facts handed to the vision model alongside the image:
/// capture date and resolved location, when known.
fn photo_context(location: Option<&str>, capture_date: Option<NaiveDateTime>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(date) = capture_date {
        parts.push(format!("taken {}", date.format("%Y-%m-%d")));
    }
    if let Some(location) = location {
        parts.push(format!("near {location}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

async fn bind_vision(config: &VisionConfig) -> Option<VisionHandle> {
    let kind = config.vendor.as_deref().and_then(VendorKind::parse);
    let adapter = match kind {
        // A validated configuration already names the kind; no re-probe.
        Some(kind) => VisionAdapter::bind(&config.endpoint, config.api_key.clone(), kind),
        None => VisionAdapter::detect(&config.endpoint, config.api_key.clone()).await,
    };
    if adapter.kind().is_none() {
        warn!(endpoint = %config.endpoint, "vision configured but no backend detected; enrichment disabled");
        return None;
    }
    Some(VisionHandle {
        adapter: Arc::new(adapter),
        model: config.model.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn photo_context_combines_date_and_location() {
        let date = NaiveDate::from_ymd_opt(2021, 7, 4).and_then(|d| d.and_hms_opt(12, 0, 0));
        assert_eq!(
            photo_context(Some("Lisbon, Portugal"), date).as_deref(),
            Some("taken 2021-07-04, near Lisbon, Portugal")
        );
        assert_eq!(photo_context(None, date).as_deref(), Some("taken 2021-07-04"));
        assert_eq!(
            photo_context(Some("Lisbon, Portugal"), None).as_deref(),
            Some("near Lisbon, Portugal")
        );
        assert_eq!(photo_context(None, None), None);
    }
}
