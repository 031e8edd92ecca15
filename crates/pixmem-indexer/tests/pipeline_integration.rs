//! End-to-end ingestion and search over a real temporary directory,
//! with deterministic embedding and a canned OCR stub.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use pixmem_core::VisionStatus;
use pixmem_indexer::{Collection, NoGeocode, SearchOptions, TextExtractor};
use pixmem_memory::HashEmbedding;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// OCR stub keyed on the filename stem, so enrichment is deterministic
/// without a tesseract install.
struct StubOcr;

#[async_trait]
impl TextExtractor for StubOcr {
    async fn extract(&self, path: &Path) -> String {
        match path.file_stem().and_then(|s| s.to_str()) {
            Some("beach") => "sunny beach with waves and sand".to_string(),
            Some(stem) if stem.starts_with("receipt") => {
                "GROCERY MART\ntotal 12.50".to_string()
            }
            _ => String::new(),
        }
    }
}

fn write_png(path: &Path, color: [u8; 3]) {
    image::RgbImage::from_pixel(32, 32, image::Rgb(color))
        .save(path)
        .unwrap();
}

/// A tree with three images, two of which are byte-identical copies.
fn seed_tree(dir: &Path) {
    write_png(&dir.join("beach.png"), [20, 120, 220]);
    write_png(&dir.join("receipt.png"), [240, 240, 240]);
    std::fs::copy(dir.join("receipt.png"), dir.join("receipt_copy.png")).unwrap();
}

async fn mount(dir: &Path) -> Collection {
    Collection::mount(
        dir,
        Arc::new(HashEmbedding::default()),
        Arc::new(StubOcr),
        Arc::new(NoGeocode),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn scan_dedups_by_content_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;

    // Two distinct contents; the identical copy collapses to one record.
    let first = collection.scan(false).await.unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(collection.count().unwrap(), 2);

    // A second pass over unchanged files writes nothing.
    let second = collection.scan(false).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(collection.count().unwrap(), 2);
}

#[tokio::test]
async fn search_ranks_matching_image_first_and_cuts_noise() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;
    collection.scan(false).await.unwrap();

    let hits = collection
        .search("sunny beach with waves", &SearchOptions::default())
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].path.ends_with("beach.png"));
    assert!(hits[0].distance <= SearchOptions::default().max_distance);
    assert!(hits[0].thumbnail_b64.as_deref().unwrap().starts_with("data:image/jpeg;base64,"));

    // A zero cutoff admits nothing.
    let strict = SearchOptions {
        max_distance: 0.0,
        ..SearchOptions::default()
    };
    let none = collection
        .search("sunny beach with waves", &strict)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn moved_file_keeps_its_record_under_the_new_path() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;
    collection.scan(false).await.unwrap();

    std::fs::rename(dir.path().join("beach.png"), dir.path().join("moved_beach.png")).unwrap();
    let report = collection.scan(false).await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(collection.count().unwrap(), 2);

    let hits = collection
        .search("sunny beach with waves", &SearchOptions::default())
        .await
        .unwrap();
    assert!(hits[0].path.ends_with("moved_beach.png"));
}

#[tokio::test]
async fn rebuild_reenriches_in_place_without_changing_identity() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;
    collection.scan(false).await.unwrap();

    let before = collection
        .search("sunny beach with waves", &SearchOptions::default())
        .await
        .unwrap();
    let original_id = before[0].file_id;

    let report = collection.scan(true).await.unwrap();
    assert_eq!(report.added, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(collection.count().unwrap(), 2);

    let after = collection
        .search("sunny beach with waves", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(after[0].file_id, original_id);
}

#[tokio::test]
async fn date_filter_never_excludes_records_without_a_capture_date() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;
    collection.scan(false).await.unwrap();

    // Generated PNGs carry no EXIF block at all.
    let opts = SearchOptions {
        date_from: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
        date_to: chrono::NaiveDate::from_ymd_opt(2030, 12, 31),
        ..SearchOptions::default()
    };
    let hits = collection.search("sunny beach with waves", &opts).await.unwrap();
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn records_survive_remount() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    {
        let collection = mount(dir.path()).await;
        collection.scan(false).await.unwrap();
    }

    let reopened = mount(dir.path()).await;
    assert_eq!(reopened.count().unwrap(), 2);
    let hits = reopened
        .search("sunny beach with waves", &SearchOptions::default())
        .await
        .unwrap();
    assert!(hits[0].path.ends_with("beach.png"));
}

#[tokio::test]
async fn tightening_the_cutoff_only_removes_results() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;
    collection.scan(false).await.unwrap();

    // Normalized embeddings keep every squared distance in [0, 4], so a
    // cutoff of 4.0 admits the whole index.
    let loose = SearchOptions {
        max_distance: 4.0,
        ..SearchOptions::default()
    };
    let all = collection
        .search("sunny beach with waves", &loose)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let default_hits = collection
        .search("sunny beach with waves", &SearchOptions::default())
        .await
        .unwrap();
    assert!(!default_hits.is_empty());
    assert!(default_hits.len() <= all.len());
    for hit in &default_hits {
        assert!(all.iter().any(|a| a.file_id == hit.file_id));
    }

    // Tighten to exactly the best hit's distance: the bound is inclusive,
    // and everything admitted must also appear at the looser cutoff.
    let tight = SearchOptions {
        max_distance: default_hits[0].distance,
        ..SearchOptions::default()
    };
    let tight_hits = collection
        .search("sunny beach with waves", &tight)
        .await
        .unwrap();
    assert!(!tight_hits.is_empty());
    assert!(tight_hits.len() <= default_hits.len());
    for hit in &tight_hits {
        assert!(default_hits.iter().any(|d| d.file_id == hit.file_id));
    }
}

#[tokio::test]
async fn disabled_vision_scan_leaves_records_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llava:13b", "details": { "families": ["clip"] } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": json!({
                "summary": "A single colored square.",
                "activity": "none",
                "setting": "abstract",
                "social_context": "none",
                "objects": ["square"],
                "people_count": 0
            })
            .to_string()
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let mut collection = mount(dir.path()).await;
    collection
        .configure_vision(&server.uri(), None, "llava:13b")
        .await
        .unwrap();

    // With vision switched off for this session, the scan must never call
    // the backend, and every record stays pending for later enrichment.
    collection.disable_vision();
    collection.scan(false).await.unwrap();

    let loose = SearchOptions {
        max_distance: 4.0,
        ..SearchOptions::default()
    };
    let hits = collection
        .search("sunny beach with waves", &loose)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert_eq!(hit.vision_status, VisionStatus::Pending);
        assert_eq!(hit.tags, "untagged");
    }
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    seed_tree(dir.path());
    let collection = mount(dir.path()).await;

    assert!(collection.search("   ", &SearchOptions::default()).await.is_err());
}

#[tokio::test]
async fn mounting_a_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let result = Collection::mount(
        missing,
        Arc::new(HashEmbedding::default()),
        Arc::new(StubOcr),
        Arc::new(NoGeocode),
    )
    .await;
    assert!(result.is_err());
}
