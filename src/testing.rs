//! In-memory backends for tests.

use crate::backend::{AnnotationStore, PaginationBackend, PositionLookup, ReaderInfo};
use crate::content::{ChapterInfo, PageBody, PageContent};
use crate::db::{Bookmark, Highlight, HighlightColor, ReadingProgress, now_timestamp};
use crate::error::{ReaderError, Result};
use crate::position::NormalizedPosition;
use crate::viewport::ViewportConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Image,
}

/// Book whose pages evenly split the position space.
pub(crate) struct FakeBook {
    kind: Kind,
    total_pages: AtomicU32,
    offline: AtomicBool,
    info_error: Mutex<Option<String>>,
    failing: Mutex<HashSet<u32>>,
    delays: Mutex<HashMap<u32, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBook {
    fn new(kind: Kind, total_pages: u32) -> Arc<Self> {
        Arc::new(Self {
            kind,
            total_pages: AtomicU32::new(total_pages),
            offline: AtomicBool::new(false),
            info_error: Mutex::new(None),
            failing: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn text(total_pages: u32) -> Arc<Self> {
        Self::new(Kind::Text, total_pages)
    }

    pub(crate) fn images(total_pages: u32) -> Arc<Self> {
        Self::new(Kind::Image, total_pages)
    }

    pub(crate) fn page(&self, page: u32) -> PageContent {
        let total = f64::from(self.total_pages.load(Ordering::SeqCst));
        let body = match self.kind {
            Kind::Text => PageBody::Text {
                html: format!("<p>Page {page} of the <em>fake</em> book.</p>"),
            },
            Kind::Image => PageBody::Image {
                image_url: format!("/pages/{page}.jpg"),
            },
        };
        PageContent {
            position: NormalizedPosition::new(f64::from(page - 1) / total),
            end_position: NormalizedPosition::new(f64::from(page) / total),
            page_number: None,
            chapter: Some(ChapterInfo {
                title: Some("Chapter".to_string()),
                index: Some(0),
            }),
            body,
        }
    }

    pub(crate) fn set_total_pages(&self, total_pages: u32) {
        self.total_pages.store(total_pages, Ordering::SeqCst);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_info_error(&self, error: Option<&str>) {
        *self.info_error.lock() = error.map(str::to_string);
    }

    pub(crate) fn fail_page(&self, page: u32) {
        self.failing.lock().insert(page);
    }

    pub(crate) fn heal_page(&self, page: u32) {
        self.failing.lock().remove(&page);
    }

    pub(crate) fn delay_page(&self, page: u32, delay: Duration) {
        self.delays.lock().insert(page, delay);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ReaderError::Backend("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaginationBackend for FakeBook {
    async fn get_reader_info(
        &self,
        _book_id: &str,
        _viewport: &ViewportConfig,
        _format_override: Option<&str>,
    ) -> Result<ReaderInfo> {
        self.log("info".to_string());
        self.check_online()?;
        Ok(ReaderInfo {
            total_pages: self.total_pages.load(Ordering::SeqCst),
            error: self.info_error.lock().clone(),
        })
    }

    async fn get_reader_page(
        &self,
        _book_id: &str,
        page_number: u32,
        _viewport: &ViewportConfig,
        _format_override: Option<&str>,
    ) -> Result<PageContent> {
        self.log(format!("page:{page_number}"));
        let delay = self.delays.lock().get(&page_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        let total = self.total_pages.load(Ordering::SeqCst);
        if page_number == 0 || page_number > total || self.failing.lock().contains(&page_number) {
            return Err(ReaderError::Backend(format!("page {page_number} unavailable")));
        }
        Ok(self.page(page_number))
    }

    async fn get_reader_page_for_position(
        &self,
        _book_id: &str,
        position: NormalizedPosition,
        _viewport: &ViewportConfig,
        _format_override: Option<&str>,
    ) -> Result<PositionLookup> {
        self.log(format!("position:{}", position.value()));
        self.check_online()?;
        let total = self.total_pages.load(Ordering::SeqCst).max(1);
        let index = (position.value() * f64::from(total) + 1e-9).floor() as u32;
        let page_num = (index + 1).min(total);
        Ok(PositionLookup {
            page_num,
            content: self.page(page_num),
        })
    }

    async fn preload_image(&self, url: &str) {
        self.log(format!("preload:{url}"));
    }
}

/// Annotation store that can be switched offline.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub(crate) highlights: Mutex<Vec<Highlight>>,
    pub(crate) bookmarks: Mutex<Vec<Bookmark>>,
    progress: Mutex<Vec<ReadingProgress>>,
    offline: AtomicBool,
}

impl FakeStore {
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn seed_highlight(&self, id: &str, book_id: &str, start: f64, end: f64) {
        self.highlights.lock().push(Highlight {
            id: id.to_string(),
            book_id: book_id.to_string(),
            start_position: NormalizedPosition::new(start),
            end_position: NormalizedPosition::new(end),
            text: String::new(),
            note: None,
            color: HighlightColor::Yellow,
            created_at: 0,
        });
    }

    pub(crate) fn saved_progress(&self) -> Vec<(NormalizedPosition, u32)> {
        self.progress
            .lock()
            .iter()
            .map(|p| (p.position, p.page_number))
            .collect()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ReaderError::Storage("store offline".to_string()));
        }
        Ok(())
    }

    fn with_highlight(&self, id: &str, update: impl FnOnce(&mut Highlight)) -> Result<()> {
        self.check_online()?;
        let mut highlights = self.highlights.lock();
        let highlight = highlights
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| ReaderError::Storage(format!("highlight {id} not found")))?;
        update(highlight);
        Ok(())
    }
}

#[async_trait]
impl AnnotationStore for FakeStore {
    async fn get_bookmarks(&self, book_id: &str) -> Result<Vec<Bookmark>> {
        self.check_online()?;
        Ok(self
            .bookmarks
            .lock()
            .iter()
            .filter(|b| b.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn get_highlights(&self, book_id: &str) -> Result<Vec<Highlight>> {
        self.check_online()?;
        Ok(self
            .highlights
            .lock()
            .iter()
            .filter(|h| h.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn add_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        self.check_online()?;
        self.bookmarks.lock().push(bookmark.clone());
        Ok(())
    }

    async fn delete_bookmark(&self, id: &str) -> Result<()> {
        self.check_online()?;
        self.bookmarks.lock().retain(|b| b.id != id);
        Ok(())
    }

    async fn add_highlight(&self, highlight: &Highlight) -> Result<()> {
        self.check_online()?;
        self.highlights.lock().push(highlight.clone());
        Ok(())
    }

    async fn delete_highlight(&self, id: &str) -> Result<()> {
        self.check_online()?;
        self.highlights.lock().retain(|h| h.id != id);
        Ok(())
    }

    async fn update_highlight_note(&self, id: &str, note: Option<&str>) -> Result<()> {
        self.with_highlight(id, |h| h.note = note.map(str::to_string))
    }

    async fn update_highlight_color(&self, id: &str, color: HighlightColor) -> Result<()> {
        self.with_highlight(id, |h| h.color = color)
    }

    async fn save_reading_progress(
        &self,
        book_id: &str,
        position: NormalizedPosition,
        page_number: u32,
    ) -> Result<()> {
        self.check_online()?;
        self.progress.lock().push(ReadingProgress {
            book_id: book_id.to_string(),
            position,
            page_number,
            updated_at: now_timestamp(),
        });
        Ok(())
    }

    async fn get_reading_progress(&self, book_id: &str) -> Result<Option<ReadingProgress>> {
        self.check_online()?;
        Ok(self
            .progress
            .lock()
            .iter()
            .rev()
            .find(|p| p.book_id == book_id)
            .cloned())
    }
}
