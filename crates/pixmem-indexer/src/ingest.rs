use pixmem_vision::VisionContract;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Fixed allow-list of raster formats picked up during a directory walk.
/// Anything else is ignored.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tiff", "tif", "gif"];

/// Upper bound on a derived summary, in characters.
const SUMMARY_MAX_CHARS: usize = 300;

/// Sentinel tag marking records whose tags came from the non-vision
/// fallback path, so they can be re-enriched later.
pub(crate) const TAGS_FALLBACK: &str = "untagged";

/// How many vision-reported objects become tags.
const TAG_OBJECT_LIMIT: usize = 5;

/// Counts from one scan over a directory tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Records newly written (or rewritten under `rebuild`).
    pub added: usize,
    /// Files passed over: unreadable, or already known by content hash.
    pub skipped: usize,
}

/// Walks the tree under `root` and returns every file whose extension is
/// in the supported image set.
pub(crate) fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect()
}

/// Derives the record summary when vision did not run or failed: first
/// non-blank OCR line, truncated; failing that, the filename with
/// separators normalized to spaces.
pub(crate) fn fallback_summary(ocr_text: &str, filename: &str) -> String {
    let first_line = ocr_text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty());
    match first_line {
        Some(line) => truncate_chars(line, SUMMARY_MAX_CHARS),
        None => truncate_chars(&filename.replace(['_', '-'], " "), SUMMARY_MAX_CHARS),
    }
}

/// Derives the tag string from a validated vision contract: the most
/// prominent objects, the setting and time of day when reported, and the
/// resolved location when one exists.
pub(crate) fn vision_tags(contract: &VisionContract, location: Option<&str>) -> String {
    let mut tags: Vec<String> = contract
        .objects
        .iter()
        .take(TAG_OBJECT_LIMIT)
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if !contract.setting.trim().is_empty() {
        tags.push(contract.setting.trim().to_string());
    }
    if let Some(time_of_day) = contract.time_of_day.as_deref() {
        if !time_of_day.trim().is_empty() {
            tags.push(time_of_day.trim().to_string());
        }
    }
    if let Some(location) = location {
        tags.push(location.to_string());
    }
    if tags.is_empty() {
        TAGS_FALLBACK.to_string()
    } else {
        tags.join(", ")
    }
}

/// The text fed to the embedding stage: summary, tags, and OCR output
/// concatenated.
pub(crate) fn embedding_text(summary: &str, tags: &str, ocr_text: &str) -> String {
    format!("{summary} {tags} {ocr_text}").trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
