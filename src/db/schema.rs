use crate::backend::AnnotationStore;
use crate::db::*;
use crate::error::{ReaderError, Result};
use crate::position::NormalizedPosition;
use crate::settings::SettingsStorage;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ReaderError::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ReaderError::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Highlights table
            CREATE TABLE IF NOT EXISTS highlights (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                start_position REAL NOT NULL,
                end_position REAL NOT NULL,
                text TEXT NOT NULL,
                note TEXT,
                color TEXT NOT NULL DEFAULT 'yellow',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Bookmarks table
            CREATE TABLE IF NOT EXISTS bookmarks (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                position REAL NOT NULL,
                page_number INTEGER,
                title TEXT,
                note TEXT,
                created_at INTEGER NOT NULL
            );

            -- Reading progress table
            CREATE TABLE IF NOT EXISTS reading_progress (
                book_id TEXT PRIMARY KEY,
                position REAL NOT NULL,
                page_number INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Reader settings (JSON blobs)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_highlights_book ON highlights(book_id, start_position);
            CREATE INDEX IF NOT EXISTS idx_bookmarks_book ON bookmarks(book_id, position);
            "#,
        )
        .map_err(|e| ReaderError::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== HIGHLIGHT OPERATIONS ==========

    /// Save a highlight.
    pub fn save_highlight(&self, highlight: &Highlight) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO highlights
             (id, book_id, start_position, end_position, text, note, color, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (id) DO UPDATE SET
                note = excluded.note,
                color = excluded.color,
                updated_at = excluded.updated_at",
            params![
                highlight.id,
                highlight.book_id,
                highlight.start_position.value(),
                highlight.end_position.value(),
                highlight.text,
                highlight.note,
                highlight.color.as_str(),
                highlight.created_at,
                now_timestamp(),
            ],
        )
        .map_err(|e| ReaderError::Storage(format!("Failed to save highlight: {}", e)))?;
        Ok(())
    }

    /// Get highlights for a book, in reading order.
    pub fn get_highlights(&self, book_id: &str) -> Result<Vec<Highlight>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_id, start_position, end_position, text, note, color, created_at
                 FROM highlights WHERE book_id = ?1
                 ORDER BY start_position, created_at",
            )
            .map_err(|e| ReaderError::Storage(format!("Failed to prepare query: {}", e)))?;

        let highlights = stmt
            .query_map(params![book_id], row_to_highlight)
            .map_err(|e| ReaderError::Storage(format!("Failed to get highlights: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ReaderError::Storage(format!("Failed to collect highlights: {}", e)))?;

        Ok(highlights)
    }

    /// Delete highlight.
    pub fn delete_highlight(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM highlights WHERE id = ?1", params![id])
            .map_err(|e| ReaderError::Storage(format!("Failed to delete highlight: {}", e)))?;
        Ok(rows > 0)
    }

    /// Set or clear a highlight's note.
    pub fn set_highlight_note(&self, id: &str, note: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE highlights SET note = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, note, now_timestamp()],
            )
            .map_err(|e| ReaderError::Storage(format!("Failed to update highlight: {}", e)))?;
        Ok(rows > 0)
    }

    /// Change a highlight's colour.
    pub fn set_highlight_color(&self, id: &str, color: HighlightColor) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE highlights SET color = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, color.as_str(), now_timestamp()],
            )
            .map_err(|e| ReaderError::Storage(format!("Failed to update highlight: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== BOOKMARK OPERATIONS ==========

    /// Save a bookmark.
    pub fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO bookmarks (id, book_id, position, page_number, title, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                note = excluded.note",
            params![
                bookmark.id,
                bookmark.book_id,
                bookmark.position.value(),
                bookmark.page_number,
                bookmark.title,
                bookmark.note,
                bookmark.created_at,
            ],
        )
        .map_err(|e| ReaderError::Storage(format!("Failed to save bookmark: {}", e)))?;
        Ok(())
    }

    /// Get bookmarks for a book, in reading order.
    pub fn get_bookmarks(&self, book_id: &str) -> Result<Vec<Bookmark>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, book_id, position, page_number, title, note, created_at
                 FROM bookmarks WHERE book_id = ?1
                 ORDER BY position, created_at",
            )
            .map_err(|e| ReaderError::Storage(format!("Failed to prepare query: {}", e)))?;

        let bookmarks = stmt
            .query_map(params![book_id], |row| {
                Ok(Bookmark {
                    id: row.get(0)?,
                    book_id: row.get(1)?,
                    position: NormalizedPosition::new(row.get(2)?),
                    page_number: row.get(3)?,
                    title: row.get(4)?,
                    note: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .map_err(|e| ReaderError::Storage(format!("Failed to get bookmarks: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ReaderError::Storage(format!("Failed to collect bookmarks: {}", e)))?;

        Ok(bookmarks)
    }

    /// Delete bookmark.
    pub fn delete_bookmark(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM bookmarks WHERE id = ?1", params![id])
            .map_err(|e| ReaderError::Storage(format!("Failed to delete bookmark: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Save or update reading progress.
    pub fn save_progress(&self, progress: &ReadingProgress) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reading_progress (book_id, position, page_number, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (book_id) DO UPDATE SET
                position = excluded.position,
                page_number = excluded.page_number,
                updated_at = excluded.updated_at",
            params![
                progress.book_id,
                progress.position.value(),
                progress.page_number,
                progress.updated_at,
            ],
        )
        .map_err(|e| ReaderError::Storage(format!("Failed to save progress: {}", e)))?;
        Ok(())
    }

    /// Get reading progress for a book.
    pub fn get_progress(&self, book_id: &str) -> Result<Option<ReadingProgress>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT book_id, position, page_number, updated_at
             FROM reading_progress WHERE book_id = ?1",
            params![book_id],
            |row| {
                Ok(ReadingProgress {
                    book_id: row.get(0)?,
                    position: NormalizedPosition::new(row.get(1)?),
                    page_number: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| ReaderError::Storage(format!("Failed to get progress: {}", e)))
    }

    // ========== SETTINGS OPERATIONS ==========

    /// Get a stored settings blob.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| ReaderError::Storage(format!("Failed to get setting: {}", e)))
    }

    /// Store a settings blob.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value, now_timestamp()],
        )
        .map_err(|e| ReaderError::Storage(format!("Failed to save setting: {}", e)))?;
        Ok(())
    }

    /// Delete a settings blob.
    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map_err(|e| ReaderError::Storage(format!("Failed to delete setting: {}", e)))?;
        Ok(rows > 0)
    }
}

fn row_to_highlight(row: &Row<'_>) -> rusqlite::Result<Highlight> {
    let color: String = row.get(6)?;
    Ok(Highlight {
        id: row.get(0)?,
        book_id: row.get(1)?,
        start_position: NormalizedPosition::new(row.get(2)?),
        end_position: NormalizedPosition::new(row.get(3)?),
        text: row.get(4)?,
        note: row.get(5)?,
        color: color.parse().unwrap_or_default(),
        created_at: row.get(7)?,
    })
}

impl SettingsStorage for Database {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.get_setting(key)
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.set_setting(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.delete_setting(key).map(|_| ())
    }
}

#[async_trait]
impl AnnotationStore for Database {
    async fn get_bookmarks(&self, book_id: &str) -> Result<Vec<Bookmark>> {
        Database::get_bookmarks(self, book_id)
    }

    async fn get_highlights(&self, book_id: &str) -> Result<Vec<Highlight>> {
        Database::get_highlights(self, book_id)
    }

    async fn add_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        self.save_bookmark(bookmark)
    }

    async fn delete_bookmark(&self, id: &str) -> Result<()> {
        Database::delete_bookmark(self, id).map(|_| ())
    }

    async fn add_highlight(&self, highlight: &Highlight) -> Result<()> {
        self.save_highlight(highlight)
    }

    async fn delete_highlight(&self, id: &str) -> Result<()> {
        Database::delete_highlight(self, id).map(|_| ())
    }

    async fn update_highlight_note(&self, id: &str, note: Option<&str>) -> Result<()> {
        if self.set_highlight_note(id, note)? {
            Ok(())
        } else {
            Err(ReaderError::Storage(format!("Highlight not found: {}", id)))
        }
    }

    async fn update_highlight_color(&self, id: &str, color: HighlightColor) -> Result<()> {
        if self.set_highlight_color(id, color)? {
            Ok(())
        } else {
            Err(ReaderError::Storage(format!("Highlight not found: {}", id)))
        }
    }

    async fn save_reading_progress(
        &self,
        book_id: &str,
        position: NormalizedPosition,
        page_number: u32,
    ) -> Result<()> {
        self.save_progress(&ReadingProgress {
            book_id: book_id.to_string(),
            position,
            page_number,
            updated_at: now_timestamp(),
        })
    }

    async fn get_reading_progress(&self, book_id: &str) -> Result<Option<ReadingProgress>> {
        self.get_progress(book_id)
    }
}
