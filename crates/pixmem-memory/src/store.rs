use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use pixmem_core::{MemoryRecord, PixmemError, PixmemResult, VisionConfig, VisionStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    file_id TEXT PRIMARY KEY,
    path TEXT,
    hash TEXT,
    created_at TEXT,
    modified_at TEXT,
    exif_date TEXT,
    ocr_text TEXT,
    caption TEXT,
    memory_summary TEXT,
    tags TEXT,
    vision_json TEXT,
    vision_status TEXT,
    embedding BLOB,
    thumbnail BLOB,
    schema_version INTEGER DEFAULT 2
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_memories_hash ON memories(hash);
CREATE INDEX IF NOT EXISTS idx_memories_path ON memories(path);

CREATE TABLE IF NOT EXISTS vision_config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    endpoint TEXT,
    api_key TEXT,
    vendor TEXT,
    model TEXT,
    last_validated_at TEXT
);
";

/// Columns added after the first released schema. Applied additively on
/// open so old collections keep working; absent values read as null.
const ADDITIVE_COLUMNS: &[&str] = &[
    "ALTER TABLE memories ADD COLUMN vision_json TEXT",
    "ALTER TABLE memories ADD COLUMN vision_status TEXT",
    "ALTER TABLE memories ADD COLUMN schema_version INTEGER DEFAULT 2",
];

const EXIF_DATE_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQLite-backed persistent store: one row per distinct content hash, plus
/// a singleton vision configuration row.
///
/// The connection is exclusively owned by one pipeline instance at a time;
/// a mutex serializes access so the store can be shared across the async
/// ingestion tasks of a single batch.
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

/// Display fields of a record, selected without the embedding blob.
#[derive(Debug, Clone)]
pub struct DisplayRow {
    /// Record identifier.
    pub file_id: Uuid,
    /// Last-known path.
    pub path: String,
    /// Display summary.
    pub memory_summary: String,
    /// Tag string.
    pub tags: String,
    /// Vision enrichment outcome.
    pub vision_status: VisionStatus,
    /// EXIF capture date, when known.
    pub exif_date: Option<NaiveDateTime>,
    /// JPEG thumbnail bytes, when present.
    pub thumbnail: Option<Vec<u8>>,
}

/// An embedding with its index key, as read back for index rebuilds.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    /// Record identifier.
    pub file_id: Uuid,
    /// Last-known path.
    pub path: String,
    /// Stored embedding vector; empty when the column is null.
    pub embedding: Vec<f32>,
}

impl MemoryStore {
    /// Opens (or creates) the store at the given database path.
    ///
    /// Runs schema creation and the additive column migration, so a
    /// collection indexed by an older release opens cleanly.
    pub fn open(db_path: &Path) -> PixmemResult<Self> {
        let conn = Connection::open(db_path).map_err(store_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(store_err)?;

        // Probe for the newest columns before creating anything: an old
        // `memories` table survives CREATE IF NOT EXISTS and needs ALTERs.
        let needs_migration = {
            let probe = conn.prepare("SELECT vision_json, vision_status FROM memories LIMIT 1");
            match probe {
                Ok(_) => false,
                Err(_) => table_exists(&conn, "memories")?,
            }
        };
        if needs_migration {
            info!("migrating memories table: adding vision columns");
            for ddl in ADDITIVE_COLUMNS {
                match conn.execute(ddl, []) {
                    Ok(_) => {}
                    Err(e) if e.to_string().contains("duplicate column") => {}
                    Err(e) => return Err(store_err(e)),
                }
            }
        }

        conn.execute_batch(SCHEMA).map_err(store_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Writes or replaces a record in a single atomic upsert. The embedding
    /// and thumbnail always travel with the rest of the row.
    pub fn upsert(&self, record: &MemoryRecord) -> PixmemResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO memories
             (file_id, path, hash, created_at, modified_at, exif_date,
              ocr_text, caption, memory_summary, tags,
              vision_json, vision_status, embedding, thumbnail, schema_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 2)",
            params![
                record.file_id.to_string(),
                record.path,
                record.hash,
                record.created_at.to_rfc3339(),
                record.modified_at.to_rfc3339(),
                record.exif_date.map(|d| d.format(EXIF_DATE_FMT).to_string()),
                record.ocr_text,
                record.caption,
                record.memory_summary,
                record.tags,
                record.vision_json,
                record.vision_status.as_str(),
                embedding_to_blob(&record.embedding),
                record.thumbnail,
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Looks up a record by its content hash. Returns the identifier and
    /// last-known path when one exists.
    pub fn find_by_hash(&self, hash: &str) -> PixmemResult<Option<(Uuid, String)>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT file_id, path FROM memories WHERE hash = ?1",
            params![hash],
            |row| {
                let id: String = row.get("file_id")?;
                let path: String = row.get("path")?;
                Ok((id, path))
            },
        )
        .optional()
        .map_err(store_err)?
        .map(|(id, path)| Ok((parse_uuid(&id)?, path)))
        .transpose()
    }

    /// Updates the last-known path of a record without touching its derived
    /// fields. Used when a known hash reappears at a new location.
    pub fn update_path(
        &self,
        file_id: Uuid,
        path: &str,
        modified_at: DateTime<Utc>,
    ) -> PixmemResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE memories SET path = ?2, modified_at = ?3 WHERE file_id = ?1",
            params![file_id.to_string(), path, modified_at.to_rfc3339()],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Fetches a full record by identifier.
    pub fn get(&self, file_id: Uuid) -> PixmemResult<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT file_id, path, hash, created_at, modified_at, exif_date,
                    ocr_text, caption, memory_summary, tags,
                    vision_json, vision_status, embedding, thumbnail
             FROM memories WHERE file_id = ?1",
            params![file_id.to_string()],
            record_from_row,
        )
        .optional()
        .map_err(store_err)
    }

    /// Fetches the display fields of a record (no embedding blob).
    pub fn display(&self, file_id: Uuid) -> PixmemResult<Option<DisplayRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT file_id, path, memory_summary, tags, vision_status, exif_date, thumbnail
             FROM memories WHERE file_id = ?1",
            params![file_id.to_string()],
            |row| {
                let id: String = row.get("file_id")?;
                let status: Option<String> = row.get("vision_status")?;
                let exif: Option<String> = row.get("exif_date")?;
                Ok(DisplayRow {
                    file_id: uuid_from_row(&id)?,
                    path: row.get("path")?,
                    memory_summary: row.get::<_, Option<String>>("memory_summary")?.unwrap_or_default(),
                    tags: row.get::<_, Option<String>>("tags")?.unwrap_or_default(),
                    vision_status: VisionStatus::parse(status.as_deref()),
                    exif_date: exif.and_then(|s| NaiveDateTime::parse_from_str(&s, EXIF_DATE_FMT).ok()),
                    thumbnail: row.get("thumbnail")?,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    /// Fetches only the thumbnail bytes of a record.
    pub fn thumbnail(&self, file_id: Uuid) -> PixmemResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let blob: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT thumbnail FROM memories WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| row.get("thumbnail"),
            )
            .optional()
            .map_err(store_err)?;
        Ok(blob.flatten())
    }

    /// Reads every stored embedding with its index key. Null embedding
    /// columns come back as empty vectors and are the caller's to skip.
    pub fn embeddings(&self) -> PixmemResult<Vec<EmbeddingRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT file_id, path, embedding FROM memories")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get("file_id")?;
                let path: String = row.get("path")?;
                let blob: Option<Vec<u8>> = row.get("embedding")?;
                Ok((id, path, blob))
            })
            .map_err(store_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (id, path, blob) = row.map_err(store_err)?;
            out.push(EmbeddingRow {
                file_id: parse_uuid(&id)?,
                path,
                embedding: blob.as_deref().map(embedding_from_blob).unwrap_or_default(),
            });
        }
        Ok(out)
    }

    /// Number of records in the store.
    pub fn count(&self) -> PixmemResult<u64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(1) FROM memories", [], |row| row.get(0))
            .map_err(store_err)
    }

    /// Reads the singleton vision configuration, when one has been saved.
    pub fn vision_config(&self) -> PixmemResult<Option<VisionConfig>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT endpoint, api_key, vendor, model, last_validated_at
             FROM vision_config WHERE id = 1",
            [],
            |row| {
                let validated: Option<String> = row.get("last_validated_at")?;
                Ok(VisionConfig {
                    endpoint: row.get("endpoint")?,
                    api_key: row.get("api_key")?,
                    vendor: row.get("vendor")?,
                    model: row.get("model")?,
                    last_validated_at: validated.and_then(|s| {
                        DateTime::parse_from_rfc3339(&s)
                            .map(|d| d.with_timezone(&Utc))
                            .ok()
                    }),
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    /// Replaces the singleton vision configuration. Callers must have run
    /// the validation gate first; the store itself does not re-validate.
    pub fn save_vision_config(&self, config: &VisionConfig) -> PixmemResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO vision_config
             (id, endpoint, api_key, vendor, model, last_validated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                config.endpoint,
                config.api_key,
                config.vendor,
                config.model,
                config.last_validated_at.map(|d| d.to_rfc3339()),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }
}

fn store_err(e: rusqlite::Error) -> PixmemError {
    PixmemError::Store(e.to_string())
}

fn parse_uuid(s: &str) -> PixmemResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| PixmemError::Store(format!("bad file_id {s}: {e}")))
}

/// Same decode for use inside rusqlite row mappers; a corrupted `file_id`
/// surfaces as a store error, never as the nil UUID.
fn uuid_from_row(s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn embedding_from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let id: String = row.get("file_id")?;
    let created: String = row.get("created_at")?;
    let modified: String = row.get("modified_at")?;
    let exif: Option<String> = row.get("exif_date")?;
    let status: Option<String> = row.get("vision_status")?;
    let embedding: Option<Vec<u8>> = row.get("embedding")?;
    let thumbnail: Option<Vec<u8>> = row.get("thumbnail")?;
    Ok(MemoryRecord {
        file_id: uuid_from_row(&id)?,
        path: row.get("path")?,
        hash: row.get("hash")?,
        created_at: parse_rfc3339_or_epoch(&created),
        modified_at: parse_rfc3339_or_epoch(&modified),
        exif_date: exif.and_then(|s| NaiveDateTime::parse_from_str(&s, EXIF_DATE_FMT).ok()),
        ocr_text: row.get::<_, Option<String>>("ocr_text")?.unwrap_or_default(),
        caption: row.get::<_, Option<String>>("caption")?.unwrap_or_default(),
        memory_summary: row
            .get::<_, Option<String>>("memory_summary")?
            .unwrap_or_default(),
        tags: row.get::<_, Option<String>>("tags")?.unwrap_or_default(),
        vision_json: row.get("vision_json")?,
        vision_status: VisionStatus::parse(status.as_deref()),
        embedding: embedding.as_deref().map(embedding_from_blob).unwrap_or_default(),
        thumbnail: thumbnail.unwrap_or_default(),
    })
}

fn parse_rfc3339_or_epoch(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

fn table_exists(conn: &Connection, name: &str) -> PixmemResult<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |_| Ok(()),
    )
    .optional()
    .map_err(store_err)
    .map(|found| found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_record(path: &str, hash: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            file_id: Uuid::new_v4(),
            path: path.to_string(),
            hash: hash.to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            exif_date: None,
            ocr_text: "receipt total 12.50".to_string(),
            caption: "receipt".to_string(),
            memory_summary: "receipt total 12.50".to_string(),
            tags: "untagged".to_string(),
            vision_json: None,
            vision_status: VisionStatus::Pending,
            embedding,
            thumbnail: vec![0xFF, 0xD8, 0xFF],
        }
    }

    fn open_temp() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(&dir.path().join("mem.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let (_dir, store) = open_temp();
        let mut record = make_record("/photos/a.jpg", "aaa", vec![0.25, -1.5, 3.0]);
        record.exif_date = NaiveDate::from_ymd_opt(2021, 7, 4)
            .unwrap()
            .and_hms_opt(12, 30, 0);
        store.upsert(&record).unwrap();

        let loaded = store.get(record.file_id).unwrap().unwrap();
        assert_eq!(loaded.path, "/photos/a.jpg");
        assert_eq!(loaded.hash, "aaa");
        assert_eq!(loaded.embedding, vec![0.25, -1.5, 3.0]);
        assert_eq!(loaded.exif_date, record.exif_date);
        assert_eq!(loaded.vision_status, VisionStatus::Pending);
        assert_eq!(loaded.thumbnail, vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn find_by_hash_and_path_touch() {
        let (_dir, store) = open_temp();
        let record = make_record("/photos/a.jpg", "h1", vec![1.0]);
        store.upsert(&record).unwrap();

        let (id, path) = store.find_by_hash("h1").unwrap().unwrap();
        assert_eq!(id, record.file_id);
        assert_eq!(path, "/photos/a.jpg");
        assert!(store.find_by_hash("h2").unwrap().is_none());

        store.update_path(id, "/moved/a.jpg", Utc::now()).unwrap();
        let (_, moved) = store.find_by_hash("h1").unwrap().unwrap();
        assert_eq!(moved, "/moved/a.jpg");
        // A path move never creates a second record.
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn upsert_same_file_id_replaces() {
        let (_dir, store) = open_temp();
        let mut record = make_record("/photos/a.jpg", "h1", vec![1.0]);
        store.upsert(&record).unwrap();

        record.memory_summary = "rewritten".to_string();
        store.upsert(&record).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let loaded = store.get(record.file_id).unwrap().unwrap();
        assert_eq!(loaded.memory_summary, "rewritten");
    }

    #[test]
    fn embeddings_returns_keys_and_vectors() {
        let (_dir, store) = open_temp();
        store.upsert(&make_record("/a.jpg", "h1", vec![1.0, 2.0])).unwrap();
        store.upsert(&make_record("/b.jpg", "h2", vec![3.0, 4.0])).unwrap();

        let rows = store.embeddings().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.embedding.len() == 2));
    }

    #[test]
    fn corrupted_file_id_is_an_error_not_nil() {
        let (_dir, store) = open_temp();
        store.upsert(&make_record("/a.jpg", "h1", vec![1.0])).unwrap();
        {
            let conn = store.conn.lock();
            conn.execute("UPDATE memories SET file_id = 'garbage'", [])
                .unwrap();
            let mapped = conn.query_row(
                "SELECT file_id, path, hash, created_at, modified_at, exif_date,
                        ocr_text, caption, memory_summary, tags,
                        vision_json, vision_status, embedding, thumbnail
                 FROM memories",
                [],
                record_from_row,
            );
            assert!(mapped.is_err());
        }
        assert!(store.embeddings().is_err());
    }

    #[test]
    fn vision_config_round_trip() {
        let (_dir, store) = open_temp();
        assert!(store.vision_config().unwrap().is_none());

        let config = VisionConfig {
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            vendor: Some("ollama".to_string()),
            model: "llava:13b".to_string(),
            last_validated_at: Some(Utc::now()),
        };
        store.save_vision_config(&config).unwrap();

        let loaded = store.vision_config().unwrap().unwrap();
        assert_eq!(loaded.endpoint, config.endpoint);
        assert_eq!(loaded.vendor.as_deref(), Some("ollama"));
        assert!(loaded.last_validated_at.is_some());
    }

    #[test]
    fn opens_legacy_schema_with_additive_migration() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mem.db");

        // A collection written before the vision columns existed.
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE memories (
                    file_id TEXT PRIMARY KEY, path TEXT, hash TEXT,
                    created_at TEXT, modified_at TEXT, exif_date TEXT,
                    ocr_text TEXT, caption TEXT, memory_summary TEXT, tags TEXT,
                    embedding BLOB, thumbnail BLOB);
                 INSERT INTO memories (file_id, path, hash) VALUES
                    ('8c1f3a52-0000-0000-0000-000000000001', '/old.jpg', 'legacy');",
            )
            .unwrap();
        }

        let store = MemoryStore::open(&db_path).unwrap();
        let (id, _) = store.find_by_hash("legacy").unwrap().unwrap();
        let loaded = store.get(id).unwrap().unwrap();
        // Absent columns read as empty, never as an error.
        assert_eq!(loaded.vision_status, VisionStatus::Pending);
        assert!(loaded.vision_json.is_none());
        assert!(loaded.embedding.is_empty());
    }
}
