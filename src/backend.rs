//! Interfaces of the collaborators the reader consumes.

use crate::content::PageContent;
use crate::db::{Bookmark, Highlight, HighlightColor, ReadingProgress};
use crate::error::Result;
use crate::position::NormalizedPosition;
use crate::viewport::ViewportConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Book-level pagination facts for one viewport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderInfo {
    /// Number of pages under the requested viewport.
    pub total_pages: u32,
    /// Failure reported by the backend (e.g. the file could not be parsed).
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of a position lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionLookup {
    /// Page containing the position.
    pub page_num: u32,
    /// Content of that page.
    pub content: PageContent,
}

/// Turns a book into pages for a viewport.
#[async_trait]
pub trait PaginationBackend: Send + Sync {
    /// Total pages for the viewport.
    async fn get_reader_info(
        &self,
        book_id: &str,
        viewport: &ViewportConfig,
        format_override: Option<&str>,
    ) -> Result<ReaderInfo>;

    /// Content of one page (1-based).
    async fn get_reader_page(
        &self,
        book_id: &str,
        page_number: u32,
        viewport: &ViewportConfig,
        format_override: Option<&str>,
    ) -> Result<PageContent>;

    /// Page containing a position.
    async fn get_reader_page_for_position(
        &self,
        book_id: &str,
        position: NormalizedPosition,
        viewport: &ViewportConfig,
        format_override: Option<&str>,
    ) -> Result<PositionLookup>;

    /// Warm the host's image cache for a prefetched page.
    async fn preload_image(&self, _url: &str) {}
}

/// Persistence of bookmarks, highlights and progress.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Bookmarks of a book.
    async fn get_bookmarks(&self, book_id: &str) -> Result<Vec<Bookmark>>;

    /// Highlights of a book.
    async fn get_highlights(&self, book_id: &str) -> Result<Vec<Highlight>>;

    /// Persist a new bookmark.
    async fn add_bookmark(&self, bookmark: &Bookmark) -> Result<()>;

    /// Delete a bookmark by id.
    async fn delete_bookmark(&self, id: &str) -> Result<()>;

    /// Persist a new highlight.
    async fn add_highlight(&self, highlight: &Highlight) -> Result<()>;

    /// Delete a highlight by id.
    async fn delete_highlight(&self, id: &str) -> Result<()>;

    /// Replace a highlight's note.
    async fn update_highlight_note(&self, id: &str, note: Option<&str>) -> Result<()>;

    /// Replace a highlight's colour.
    async fn update_highlight_color(&self, id: &str, color: HighlightColor) -> Result<()>;

    /// Save the reading position.
    async fn save_reading_progress(
        &self,
        book_id: &str,
        position: NormalizedPosition,
        page_number: u32,
    ) -> Result<()>;

    /// Last saved reading position.
    async fn get_reading_progress(&self, book_id: &str) -> Result<Option<ReadingProgress>>;
}
