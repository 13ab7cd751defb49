use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::{AnimationMetadata, FrameMap};
use super::store::{AnimationStore, StoreError};
use crate::grid::frame::Frame;

/// The Library manages the SQLite animation database.
/// It stores the active queue, the saved catalog and every frame payload.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

impl Library {
    /// Open (or create) the library database at `db_path` and initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        debug!("📁 Database opened at: {}", db_path.display());

        let library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;

        Ok(library)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<(), StoreError> {
        // Every animation ever saved; archived ones stay for recovery
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS animations (
                id              TEXT PRIMARY KEY,
                metadata_json   TEXT NOT NULL,
                archived        INTEGER NOT NULL DEFAULT 0,
                saved_at        INTEGER NOT NULL
            )",
            [],
        )?;

        // The active queue, one row per position
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS queue (
                position        INTEGER PRIMARY KEY,
                animation_id    TEXT NOT NULL UNIQUE,
                FOREIGN KEY(animation_id) REFERENCES animations(id)
            )",
            [],
        )?;

        // Raw 768-byte frame payloads keyed by frame id
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS frames (
                id              TEXT PRIMARY KEY,
                pixels          BLOB NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_animations_saved_at
             ON animations(archived, saved_at DESC)",
            [],
        )?;

        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Count of saved, non-archived animations
    pub fn animation_count(&self) -> Result<i64, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM animations WHERE archived = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_metadata(&self, sql: &str) -> Result<Vec<AnimationMetadata>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut animations = Vec::new();
        for json in rows {
            animations.push(AnimationMetadata::from_json(&json?)?);
        }
        Ok(animations)
    }

    fn animation_exists(&self, animation_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM animations WHERE id = ?1", params![animation_id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

impl AnimationStore for Library {
    fn fetch_metadata(&self) -> Result<Vec<AnimationMetadata>, StoreError> {
        self.query_metadata(
            "SELECT a.metadata_json FROM queue q
             JOIN animations a ON a.id = q.animation_id
             ORDER BY q.position",
        )
    }

    fn fetch_catalog(&self) -> Result<Vec<AnimationMetadata>, StoreError> {
        self.query_metadata(
            "SELECT metadata_json FROM animations
             WHERE archived = 0
             ORDER BY saved_at DESC, id",
        )
    }

    fn fetch_frame_batch(&self, animation_id: &str, frame_order: &[String]) -> Result<Vec<u8>, StoreError> {
        if !self.animation_exists(animation_id)? {
            return Err(StoreError::NotFound(animation_id.to_string()));
        }

        let mut stmt = self.conn.prepare_cached("SELECT pixels FROM frames WHERE id = ?1")?;
        let mut blob = Vec::with_capacity(frame_order.len() * crate::grid::frame::FRAME_BYTES);
        for frame_id in frame_order {
            let pixels: Vec<u8> = stmt
                .query_row(params![frame_id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| StoreError::MissingFrame(frame_id.clone()))?;
            // Validate each payload so a bad row cannot shift the rest of the batch
            let frame = Frame::from_bytes(&pixels)?;
            blob.extend_from_slice(frame.as_bytes());
        }
        Ok(blob)
    }

    fn fetch_frame(&self, frame_id: &str) -> Result<Frame, StoreError> {
        let pixels: Vec<u8> = self
            .conn
            .query_row("SELECT pixels FROM frames WHERE id = ?1", params![frame_id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| StoreError::MissingFrame(frame_id.to_string()))?;
        Ok(Frame::from_bytes(&pixels)?)
    }

    fn persist(&mut self, animations: &[AnimationMetadata], frames: &FrameMap) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM queue", [])?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO animations (id, metadata_json, archived, saved_at) VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    metadata_json = excluded.metadata_json,
                    archived = 0,
                    saved_at = excluded.saved_at",
            )?;
            let mut enqueue = tx.prepare("INSERT INTO queue (position, animation_id) VALUES (?1, ?2)")?;
            let mut write_frame = tx.prepare("INSERT OR REPLACE INTO frames (id, pixels) VALUES (?1, ?2)")?;

            // Later positions get older timestamps so the catalog lists queue order
            for (position, metadata) in animations.iter().enumerate() {
                upsert.execute(params![
                    metadata.animation_id,
                    metadata.to_json()?,
                    now - position as i64
                ])?;
                enqueue.execute(params![position as i64, metadata.animation_id])?;

                for frame_id in &metadata.frame_order {
                    let frame = frames
                        .get(frame_id)
                        .ok_or_else(|| StoreError::MissingFrame(frame_id.clone()))?;
                    write_frame.execute(params![frame_id, frame.as_bytes()])?;
                }
            }
        }
        tx.commit()?;

        info!("💾 Saved {} animations", animations.len());
        Ok(())
    }

    fn archive(&mut self, animation_id: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute("UPDATE animations SET archived = 1 WHERE id = ?1", params![animation_id])?;
        if updated == 0 {
            return Err(StoreError::NotFound(animation_id.to_string()));
        }
        tx.execute("DELETE FROM queue WHERE animation_id = ?1", params![animation_id])?;
        tx.commit()?;

        info!("🗄️  Archived animation {}", animation_id);
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
