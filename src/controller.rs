//! Page navigation state machine.
//!
//! The controller owns the current page, the page total for the active
//! viewport, the annotation lists of the open book and the background tasks
//! that prefetch upcoming pages and persist the reading position.

mod commands;
mod prefetch;

pub use commands::AnnotationCommand;

use crate::backend::{AnnotationStore, PaginationBackend};
use crate::config::ReaderConfig;
use crate::content::{ContentKind, PageContent};
use crate::db::{Bookmark, Highlight, HighlightColor, now_timestamp};
use crate::error::{ReaderError, Result};
use crate::mapper::SelectionPositions;
use crate::position::NormalizedPosition;
use crate::settings::PdfPageLayout;
use crate::viewport::ViewportConfig;
use parking_lot::Mutex;
use prefetch::{PrefetchJob, PrefetchSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

/// Lifecycle of a reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReaderState {
    /// Waiting for a measured viewport.
    #[default]
    Idle,
    /// Fetching book info and the first page.
    Loading,
    /// A page is displayed.
    Ready,
    /// A page is displayed and another one is being fetched.
    Navigating,
    /// The book could not be paginated.
    Error(String),
}

/// Whether image pages are shown two at a time.
pub fn is_spread_mode(layout: PdfPageLayout, viewport_width: u32, min_width: u32) -> bool {
    match layout {
        PdfPageLayout::Single => false,
        PdfPageLayout::Spread => true,
        PdfPageLayout::Auto => viewport_width >= min_width,
    }
}

/// Pages advanced by one navigation step.
pub fn page_step(spread: bool, kind: Option<ContentKind>) -> u32 {
    if spread && kind == Some(ContentKind::Image) {
        2
    } else {
        1
    }
}

fn clamp_page(page: i64, total_pages: u32) -> u32 {
    page.clamp(1, i64::from(total_pages.max(1))) as u32
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    /// Lifecycle state.
    pub state: ReaderState,
    /// Displayed page (1-based, 0 before the first page).
    pub current_page: u32,
    /// Page total for the active viewport.
    pub total_pages: u32,
    /// Displayed content.
    pub content: Option<PageContent>,
    /// Second page of an image spread.
    pub right_page: Option<PageContent>,
    /// Whether spread mode is active.
    pub is_spread_mode: bool,
    /// Pages advanced by next/previous.
    pub page_step: u32,
}

/// What to open.
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Book ID.
    pub book_id: String,
    /// Position to jump to before the first page is shown.
    pub initial_position: Option<NormalizedPosition>,
    /// Format hint forwarded to the backend.
    pub format_override: Option<String>,
}

impl ControllerOptions {
    /// Options for a book with no initial position.
    pub fn new(book_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            ..Self::default()
        }
    }

    /// Start at `position`.
    pub fn with_initial_position(mut self, position: NormalizedPosition) -> Self {
        self.initial_position = Some(position);
        self
    }

    /// Forward a format hint.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format_override = Some(format.into());
        self
    }
}

/// Input of [`PaginationController::add_highlight`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewHighlight {
    /// Start position.
    pub start_position: NormalizedPosition,
    /// End position.
    pub end_position: NormalizedPosition,
    /// Selected text.
    pub text: String,
    /// Colour.
    pub color: HighlightColor,
    /// Note.
    pub note: Option<String>,
}

impl NewHighlight {
    /// Highlight a mapped selection.
    pub fn from_selection(selection: SelectionPositions, color: HighlightColor) -> Self {
        Self {
            start_position: selection.start_position,
            end_position: selection.end_position,
            text: selection.text,
            color,
            note: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    state: ReaderState,
    viewport: Option<ViewportConfig>,
    info_loaded: bool,
    layout: PdfPageLayout,
    total_pages: u32,
    target_page: u32,
    current_page: u32,
    content: Option<PageContent>,
    right_page: Option<PageContent>,
    initial_position: Option<NormalizedPosition>,
    applied_ticket: u64,
    annotations_loaded: bool,
    highlights: Vec<Highlight>,
    bookmarks: Vec<Bookmark>,
    failed: Vec<AnnotationCommand>,
    pending_progress: Option<(NormalizedPosition, u32)>,
    progress_task: Option<JoinHandle<()>>,
    prefetch_task: Option<JoinHandle<()>>,
}

/// Drives pagination of one book.
pub struct PaginationController {
    book_id: String,
    format_override: Option<String>,
    config: ReaderConfig,
    pages: Arc<dyn PaginationBackend>,
    store: Arc<dyn AnnotationStore>,
    inner: Arc<Mutex<Inner>>,
    prefetched: Arc<Mutex<PrefetchSet>>,
    tickets: AtomicU64,
}

impl PaginationController {
    /// Create a controller. Nothing is fetched until a viewport is known.
    pub fn new(
        options: ControllerOptions,
        pages: Arc<dyn PaginationBackend>,
        store: Arc<dyn AnnotationStore>,
        config: ReaderConfig,
    ) -> Self {
        let inner = Inner {
            initial_position: options.initial_position,
            ..Inner::default()
        };
        Self {
            book_id: options.book_id,
            format_override: options.format_override,
            config,
            pages,
            store,
            inner: Arc::new(Mutex::new(inner)),
            prefetched: Arc::new(Mutex::new(PrefetchSet::default())),
            tickets: AtomicU64::new(0),
        }
    }

    /// Book being read.
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Lifecycle state.
    pub fn state(&self) -> ReaderState {
        self.inner.lock().state.clone()
    }

    /// Copy of the navigation state.
    pub fn snapshot(&self) -> PageState {
        let inner = self.inner.lock();
        let spread = self.spread_for(&inner);
        PageState {
            state: inner.state.clone(),
            current_page: inner.current_page,
            total_pages: inner.total_pages,
            content: inner.content.clone(),
            right_page: inner.right_page.clone(),
            is_spread_mode: spread,
            page_step: page_step(spread, inner.content.as_ref().map(PageContent::kind)),
        }
    }

    /// Pages already requested in the background.
    pub fn prefetched_pages(&self) -> Vec<u32> {
        self.prefetched.lock().pages()
    }

    fn spread_for(&self, inner: &Inner) -> bool {
        inner
            .viewport
            .is_some_and(|v| is_spread_mode(inner.layout, v.width, self.config.spread_min_width))
    }

    /// Change the image page layout. Returns whether it changed; call
    /// [`refresh`](Self::refresh) to refetch the spread.
    pub fn set_layout(&self, layout: PdfPageLayout) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.layout != layout;
        inner.layout = layout;
        changed
    }

    /// Apply a viewport configuration. Only a change triggers repagination.
    pub async fn set_viewport(&self, viewport: ViewportConfig) -> Result<()> {
        {
            let inner = self.inner.lock();
            let unchanged = inner.viewport == Some(viewport)
                && inner.info_loaded
                && !matches!(inner.state, ReaderState::Error(_));
            if unchanged {
                return Ok(());
            }
        }
        self.load(viewport).await
    }

    /// Fetch book info for `viewport` and show the first page, the initial
    /// position, or the page holding the currently displayed position.
    pub async fn load(&self, viewport: ViewportConfig) -> Result<()> {
        if !viewport.is_ready() {
            tracing::debug!(book_id = %self.book_id, "Viewport not measured yet");
            return Ok(());
        }

        let resume = {
            let mut inner = self.inner.lock();
            let resume = inner.content.as_ref().map(|c| c.position);
            inner.viewport = Some(viewport);
            inner.info_loaded = false;
            inner.state = if inner.content.is_some() {
                ReaderState::Navigating
            } else {
                ReaderState::Loading
            };
            if let Some(task) = inner.prefetch_task.take() {
                task.abort();
            }
            resume
        };
        self.prefetched.lock().reset();

        let info = match self
            .pages
            .get_reader_info(&self.book_id, &viewport, self.format_override.as_deref())
            .await
        {
            Ok(info) => info,
            Err(e) => return Err(self.fail(e)),
        };
        if let Some(message) = info.error {
            return Err(self.fail(ReaderError::BackendReported(message)));
        }
        {
            let mut inner = self.inner.lock();
            inner.total_pages = info.total_pages;
            inner.info_loaded = true;
        }
        tracing::info!(book_id = %self.book_id, total_pages = info.total_pages, "Paginated book");

        self.ensure_annotations().await;

        let initial = self.inner.lock().initial_position.take();
        let Some(position) = initial.or(resume) else {
            return self.show_page(1).await;
        };
        let result = self.go_to_position(position).await;
        let shown = self.inner.lock().content.is_some();
        match result {
            Err(e) if !shown => {
                tracing::warn!(%position, error = %e, "Could not open at position, showing first page");
                self.show_page(1).await
            }
            result => result,
        }
    }

    fn fail(&self, error: ReaderError) -> ReaderError {
        tracing::error!(book_id = %self.book_id, error = %error, "Failed to load book");
        self.inner.lock().state = ReaderState::Error(error.to_string());
        error
    }

    async fn ensure_annotations(&self) {
        if self.inner.lock().annotations_loaded {
            return;
        }
        match tokio::try_join!(
            self.store.get_highlights(&self.book_id),
            self.store.get_bookmarks(&self.book_id)
        ) {
            Ok((highlights, bookmarks)) => {
                let mut inner = self.inner.lock();
                inner.highlights = highlights;
                inner.bookmarks = bookmarks;
                inner.annotations_loaded = true;
            }
            Err(e) => tracing::warn!(book_id = %self.book_id, error = %e, "Failed to load annotations"),
        }
    }

    /// Refetch the page being shown, e.g. after a layout change.
    pub async fn refresh(&self) -> Result<()> {
        let page = self.inner.lock().target_page;
        if page == 0 {
            return Ok(());
        }
        self.show_page(page).await
    }

    /// Jump to a page, clamped into the book.
    pub async fn go_to_page(&self, page: i64) -> Result<()> {
        let total = {
            let inner = self.inner.lock();
            if !inner.info_loaded {
                return Ok(());
            }
            inner.total_pages
        };
        self.show_page(clamp_page(page, total)).await
    }

    /// Advance by one page step.
    pub async fn next_page(&self) -> Result<()> {
        let (target, next) = {
            let inner = self.inner.lock();
            if !inner.info_loaded || inner.target_page == 0 {
                return Ok(());
            }
            let step = page_step(
                self.spread_for(&inner),
                inner.content.as_ref().map(PageContent::kind),
            );
            let next = inner.target_page.saturating_add(step).min(inner.total_pages);
            (inner.target_page, next)
        };
        if next <= target {
            return Ok(());
        }
        self.show_page(next).await
    }

    /// Go back by one page step.
    pub async fn prev_page(&self) -> Result<()> {
        let (target, prev) = {
            let inner = self.inner.lock();
            if !inner.info_loaded || inner.target_page == 0 {
                return Ok(());
            }
            let step = page_step(
                self.spread_for(&inner),
                inner.content.as_ref().map(PageContent::kind),
            );
            (inner.target_page, inner.target_page.saturating_sub(step).max(1))
        };
        if prev >= target {
            return Ok(());
        }
        self.show_page(prev).await
    }

    /// Jump to the page containing `position`.
    pub async fn go_to_position(&self, position: NormalizedPosition) -> Result<()> {
        let Some((ticket, viewport, spread, total)) = self.begin_fetch(None) else {
            return Ok(());
        };
        let lookup = self
            .pages
            .get_reader_page_for_position(
                &self.book_id,
                position,
                &viewport,
                self.format_override.as_deref(),
            )
            .await;
        match lookup {
            Ok(lookup) => {
                let page = lookup.page_num;
                let right = self
                    .right_page_for(&lookup.content, page, spread, total, &viewport)
                    .await;
                self.settle(ticket, page, lookup.content, right);
                Ok(())
            }
            Err(e) => Err(self.keep_stale(ticket, e)),
        }
    }

    async fn show_page(&self, page: u32) -> Result<()> {
        let Some((ticket, viewport, spread, total)) = self.begin_fetch(Some(page)) else {
            return Ok(());
        };
        let result = self
            .pages
            .get_reader_page(&self.book_id, page, &viewport, self.format_override.as_deref())
            .await;
        match result {
            Ok(content) => {
                let right = self
                    .right_page_for(&content, page, spread, total, &viewport)
                    .await;
                self.settle(ticket, page, content, right);
                Ok(())
            }
            Err(e) => Err(self.keep_stale(ticket, e)),
        }
    }

    fn begin_fetch(&self, page: Option<u32>) -> Option<(u64, ViewportConfig, bool, u32)> {
        let mut inner = self.inner.lock();
        let viewport = inner.viewport?;
        if let Some(page) = page {
            inner.target_page = page;
        }
        if inner.state == ReaderState::Ready {
            inner.state = ReaderState::Navigating;
        }
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        Some((ticket, viewport, self.spread_for(&inner), inner.total_pages))
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.tickets.load(Ordering::SeqCst) == ticket
    }

    async fn right_page_for(
        &self,
        content: &PageContent,
        page: u32,
        spread: bool,
        total: u32,
        viewport: &ViewportConfig,
    ) -> Option<PageContent> {
        if !spread || content.kind() != ContentKind::Image || page >= total {
            return None;
        }
        match self
            .pages
            .get_reader_page(&self.book_id, page + 1, viewport, self.format_override.as_deref())
            .await
        {
            Ok(right) => Some(right),
            Err(e) => {
                tracing::warn!(page = page + 1, error = %e, "Failed to fetch right page of spread");
                None
            }
        }
    }

    fn settle(
        &self,
        ticket: u64,
        page: u32,
        mut content: PageContent,
        right: Option<PageContent>,
    ) {
        let mut inner = self.inner.lock();
        if ticket <= inner.applied_ticket {
            tracing::debug!(page, ticket, "Dropping stale page response");
            return;
        }
        inner.applied_ticket = ticket;
        let position = content.position;
        content.page_number = Some(page);
        inner.current_page = page;
        inner.content = Some(content);
        inner.right_page = right.map(|mut right| {
            right.page_number = Some(page + 1);
            right
        });
        if self.is_latest(ticket) {
            inner.target_page = page;
            inner.state = ReaderState::Ready;
        }

        self.schedule_progress(&mut inner, position, page);
        self.schedule_prefetch(&mut inner);
    }

    fn keep_stale(&self, ticket: u64, error: ReaderError) -> ReaderError {
        tracing::warn!(book_id = %self.book_id, error = %error, "Failed to fetch page");
        let mut inner = self.inner.lock();
        // Older requests still in flight must not replace the page kept on screen.
        inner.applied_ticket = inner.applied_ticket.max(ticket);
        if self.is_latest(ticket) {
            inner.target_page = inner.current_page;
            inner.state = if inner.content.is_some() {
                ReaderState::Ready
            } else {
                ReaderState::Error(error.to_string())
            };
        }
        error
    }

    fn schedule_progress(&self, inner: &mut Inner, position: NormalizedPosition, page: u32) {
        if let Some(task) = inner.progress_task.take() {
            task.abort();
        }
        inner.pending_progress = Some((position, page));

        let shared = Arc::clone(&self.inner);
        let store = Arc::clone(&self.store);
        let book_id = self.book_id.clone();
        let delay = self.config.progress_debounce();
        inner.progress_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let pending = shared.lock().pending_progress.take();
            if let Some((position, page)) = pending {
                let _ = persist_progress(store.as_ref(), &book_id, position, page).await;
            }
        }));
    }

    fn schedule_prefetch(&self, inner: &mut Inner) {
        if let Some(task) = inner.prefetch_task.take() {
            task.abort();
        }
        let Some(viewport) = inner.viewport else {
            return;
        };
        let shown = inner.current_page + u32::from(inner.right_page.is_some());
        let first = shown + 1;
        let last = shown
            .saturating_add(self.config.prefetch_count)
            .min(inner.total_pages);
        if first > last {
            return;
        }

        let job = PrefetchJob {
            pages: Arc::clone(&self.pages),
            prefetched: Arc::clone(&self.prefetched),
            generation: self.prefetched.lock().generation(),
            book_id: self.book_id.clone(),
            viewport,
            format_override: self.format_override.clone(),
            first,
            last,
            delay: self.config.prefetch_delay(),
        };
        inner.prefetch_task = Some(tokio::spawn(job.run()));
    }

    /// Save the displayed position now, cancelling the pending debounce.
    pub async fn save_progress(&self) -> Result<()> {
        let current = {
            let mut inner = self.inner.lock();
            if let Some(task) = inner.progress_task.take() {
                task.abort();
            }
            inner.pending_progress = None;
            inner
                .content
                .as_ref()
                .map(|c| (c.position, inner.current_page))
        };
        match current {
            Some((position, page)) => {
                persist_progress(self.store.as_ref(), &self.book_id, position, page).await
            }
            None => Ok(()),
        }
    }

    /// Save progress that is still waiting for its debounce.
    pub async fn flush(&self) -> Result<()> {
        let pending = {
            let mut inner = self.inner.lock();
            if let Some(task) = inner.progress_task.take() {
                task.abort();
            }
            inner.pending_progress.take()
        };
        match pending {
            Some((position, page)) => {
                persist_progress(self.store.as_ref(), &self.book_id, position, page).await
            }
            None => Ok(()),
        }
    }

    /// Flush progress and stop background work.
    pub async fn close(&self) -> Result<()> {
        let result = self.flush().await;
        if let Some(task) = self.inner.lock().prefetch_task.take() {
            task.abort();
        }
        result
    }

    /// Highlights of the book, including unsaved ones.
    pub fn highlights(&self) -> Vec<Highlight> {
        self.inner.lock().highlights.clone()
    }

    /// Bookmarks of the book, including unsaved ones.
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.inner.lock().bookmarks.clone()
    }

    /// Changes that could not be persisted.
    pub fn failed_commands(&self) -> Vec<AnnotationCommand> {
        self.inner.lock().failed.clone()
    }

    /// Create a highlight.
    pub async fn add_highlight(&self, new: NewHighlight) -> Result<Highlight> {
        let (start, end) = if new.start_position <= new.end_position {
            (new.start_position, new.end_position)
        } else {
            (new.end_position, new.start_position)
        };
        if start == end {
            return Err(ReaderError::InvalidInput("empty highlight".to_string()));
        }
        let highlight = Highlight {
            id: uuid::Uuid::new_v4().to_string(),
            book_id: self.book_id.clone(),
            start_position: start,
            end_position: end,
            text: new.text,
            note: new.note,
            color: new.color,
            created_at: now_timestamp(),
        };
        self.execute(AnnotationCommand::AddHighlight(highlight.clone()))
            .await?;
        Ok(highlight)
    }

    /// Delete a highlight.
    pub async fn remove_highlight(&self, id: &str) -> Result<()> {
        self.execute(AnnotationCommand::RemoveHighlight { id: id.to_string() })
            .await
    }

    /// Recolour a highlight.
    pub async fn update_highlight_color(&self, id: &str, color: HighlightColor) -> Result<()> {
        self.execute(AnnotationCommand::UpdateHighlightColor {
            id: id.to_string(),
            color,
        })
        .await
    }

    /// Replace a highlight's note.
    pub async fn update_highlight_note(&self, id: &str, note: Option<String>) -> Result<()> {
        self.execute(AnnotationCommand::UpdateHighlightNote {
            id: id.to_string(),
            note,
        })
        .await
    }

    /// Bookmark `position`, or the displayed page when `None`.
    pub async fn add_bookmark(
        &self,
        position: Option<NormalizedPosition>,
        title: Option<String>,
        note: Option<String>,
    ) -> Result<Bookmark> {
        let (position, page_number) = match position {
            Some(position) => (position, None),
            None => {
                let inner = self.inner.lock();
                let content = inner.content.as_ref().ok_or_else(|| {
                    ReaderError::InvalidInput("no page is displayed".to_string())
                })?;
                (content.position, Some(inner.current_page))
            }
        };
        let bookmark = Bookmark {
            id: uuid::Uuid::new_v4().to_string(),
            book_id: self.book_id.clone(),
            position,
            page_number,
            title,
            note,
            created_at: now_timestamp(),
        };
        self.execute(AnnotationCommand::AddBookmark(bookmark.clone()))
            .await?;
        Ok(bookmark)
    }

    /// Delete a bookmark.
    pub async fn remove_bookmark(&self, id: &str) -> Result<()> {
        self.execute(AnnotationCommand::RemoveBookmark { id: id.to_string() })
            .await
    }

    async fn execute(&self, command: AnnotationCommand) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            let Inner {
                highlights,
                bookmarks,
                failed,
                ..
            } = &mut *inner;
            command.apply(highlights, bookmarks);
            if command.coalesce(failed) {
                tracing::debug!(
                    command = command.name(),
                    id = command.target_id(),
                    "Folded into unsaved change"
                );
                return Ok(());
            }
        }

        let sent = command.send(self.store.as_ref()).await;
        if let Err(e) = sent {
            tracing::warn!(
                command = command.name(),
                id = command.target_id(),
                error = %e,
                "Annotation change not persisted"
            );
            let error = mutation_error(&command, &e);
            self.inner.lock().failed.push(command);
            return Err(error);
        }
        Ok(())
    }

    /// Replay failed changes in order. Returns how many were persisted.
    pub async fn retry_failed(&self) -> Result<usize> {
        let queued = std::mem::take(&mut self.inner.lock().failed);
        let mut sent = 0;
        let mut first_error = None;
        let mut still_failed = Vec::new();
        for command in queued {
            let result = command.send(self.store.as_ref()).await;
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(mutation_error(&command, &e));
                    }
                    still_failed.push(command);
                }
            }
        }

        if !still_failed.is_empty() {
            let mut inner = self.inner.lock();
            still_failed.append(&mut inner.failed);
            inner.failed = still_failed;
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(sent),
        }
    }

    /// Replace the in-memory lists with the stored ones and forget failed
    /// changes.
    pub async fn reconcile(&self) -> Result<()> {
        let (highlights, bookmarks) = tokio::try_join!(
            self.store.get_highlights(&self.book_id),
            self.store.get_bookmarks(&self.book_id)
        )?;
        let mut inner = self.inner.lock();
        let dropped = inner.failed.len();
        inner.highlights = highlights;
        inner.bookmarks = bookmarks;
        inner.failed.clear();
        inner.annotations_loaded = true;
        if dropped > 0 {
            tracing::warn!(book_id = %self.book_id, dropped, "Discarded unsaved annotation changes");
        }
        Ok(())
    }
}

impl Drop for PaginationController {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        for task in [inner.progress_task.take(), inner.prefetch_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

fn mutation_error(command: &AnnotationCommand, error: &ReaderError) -> ReaderError {
    ReaderError::Mutation {
        command: command.name().to_string(),
        message: error.to_string(),
    }
}

async fn persist_progress(
    store: &dyn AnnotationStore,
    book_id: &str,
    position: NormalizedPosition,
    page: u32,
) -> Result<()> {
    match store.save_reading_progress(book_id, position, page).await {
        Ok(()) => {
            tracing::debug!(book_id, %position, page, "Saved reading progress");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(book_id, error = %e, "Failed to save reading progress");
            Err(e)
        }
    }
}
