//! One open book.
//!
//! A [`ReaderSession`] ties the settings store, the viewport tracker and the
//! pagination controller together for a single book and turns view actions
//! into controller calls. All collaborators are injected.

use crate::backend::{AnnotationStore, PaginationBackend};
use crate::config::ReaderConfig;
use crate::controller::{ControllerOptions, NewHighlight, PaginationController};
use crate::db::{Highlight, HighlightColor};
use crate::error::Result;
use crate::mapper::SelectionPositions;
use crate::renderer::{
    MediaElement, ReaderInput, RenderedPage, RendererAction, selection_settle_delay,
};
use crate::settings::{
    ReaderSettings, SettingKey, SettingScope, SettingsStorage, SettingsStore, layout_changed,
};
use crate::toolbar::Rect;
use crate::viewport::{ViewportConfig, ViewportTracker};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// External services a session reads from and writes to.
#[derive(Clone)]
pub struct SessionBackends {
    /// Pagination service.
    pub pages: Arc<dyn PaginationBackend>,
    /// Annotation and progress persistence.
    pub store: Arc<dyn AnnotationStore>,
    /// Settings persistence.
    pub settings: Arc<dyn SettingsStorage>,
}

/// Reading session of one book.
pub struct ReaderSession {
    settings: SettingsStore,
    current: Mutex<ReaderSettings>,
    tracker: ViewportTracker,
    container: Mutex<Rect>,
    controller: PaginationController,
    config: ReaderConfig,
}

impl ReaderSession {
    /// Open a book. Without an explicit initial position the last saved
    /// reading position is used.
    pub async fn open(
        mut options: ControllerOptions,
        backends: SessionBackends,
        config: ReaderConfig,
    ) -> Result<Self> {
        if options.initial_position.is_none() {
            match backends.store.get_reading_progress(&options.book_id).await {
                Ok(Some(progress)) => {
                    tracing::debug!(
                        book_id = %options.book_id,
                        position = %progress.position,
                        "Resuming from saved progress"
                    );
                    options.initial_position = Some(progress.position);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(book_id = %options.book_id, error = %e, "Failed to read saved progress")
                }
            }
        }

        let settings = SettingsStore::new(backends.settings, Some(&options.book_id));
        let current = settings.get();
        tracing::info!(book_id = %options.book_id, "Opened reader session");

        let controller =
            PaginationController::new(options, backends.pages, backends.store, config.clone());
        controller.set_layout(current.pdf_page_layout);

        Ok(Self {
            settings,
            current: Mutex::new(current),
            tracker: ViewportTracker::new(),
            container: Mutex::new(Rect::default()),
            controller,
            config,
        })
    }

    /// The pagination controller.
    pub fn controller(&self) -> &PaginationController {
        &self.controller
    }

    /// Merged settings in effect.
    pub fn settings(&self) -> ReaderSettings {
        self.current.lock().clone()
    }

    /// Report the container size. Paginates on the first usable size and
    /// repaginates when the rounded size changes.
    pub async fn resize(&self, width: f64, height: f64) -> Result<()> {
        *self.container.lock() = Rect::new(0.0, 0.0, width, height);
        if !self.tracker.observe(width, height) {
            return Ok(());
        }
        match self.viewport_config() {
            Some(viewport) => self.controller.set_viewport(viewport).await,
            None => Ok(()),
        }
    }

    fn viewport_config(&self) -> Option<ViewportConfig> {
        let viewport = self.tracker.current()?;
        viewport
            .is_ready()
            .then(|| ViewportConfig::from_parts(viewport, &self.current.lock()))
    }

    /// Store a setting and apply its effect on pagination.
    pub async fn update_setting(
        &self,
        scope: SettingScope,
        key: SettingKey,
        value: Value,
    ) -> Result<ReaderSettings> {
        self.settings.update(scope, key, value)?;
        self.reload_settings().await
    }

    /// Drop this book's overrides.
    pub async fn reset_book_settings(&self) -> Result<ReaderSettings> {
        self.settings.reset_book()?;
        self.reload_settings().await
    }

    async fn reload_settings(&self) -> Result<ReaderSettings> {
        let new = self.settings.get();
        let old = std::mem::replace(&mut *self.current.lock(), new.clone());

        if layout_changed(&old, &new) {
            tracing::debug!("Layout settings changed, repaginating");
            if let Some(viewport) = self.viewport_config() {
                self.controller.load(viewport).await?;
            }
        }
        if self.controller.set_layout(new.pdf_page_layout) {
            self.controller.refresh().await?;
        }
        Ok(new)
    }

    /// View of the displayed page with highlights drawn in.
    pub fn render<E: MediaElement>(
        &self,
        media: impl FnOnce() -> E,
    ) -> Result<Option<RenderedPage<E>>> {
        let state = self.controller.snapshot();
        let Some(content) = state.content else {
            return Ok(None);
        };
        let container = *self.container.lock();
        RenderedPage::build(
            &content,
            state.right_page.as_ref(),
            &self.settings(),
            container,
            &self.controller.highlights(),
            media,
        )
        .map(Some)
    }

    /// Redraw `view` after highlights, settings or the container size changed.
    pub fn refresh<E: MediaElement>(&self, view: &mut RenderedPage<E>) {
        view.set_container(*self.container.lock());
        view.refresh(&self.controller.highlights(), &self.settings());
    }

    /// Feed input to `view`. Selection gestures wait for the selection to
    /// settle first. Navigation actions are carried out; the action is
    /// returned so the host can re-render or show a toolbar.
    pub async fn handle_input<E: MediaElement>(
        &self,
        view: &mut RenderedPage<E>,
        input: ReaderInput,
    ) -> Result<Option<RendererAction>> {
        if let Some(delay) = selection_settle_delay(&input, &self.config) {
            tokio::time::sleep(delay).await;
        }
        let action = view.handle(&input);
        match &action {
            Some(RendererAction::NextPage) => self.controller.next_page().await?,
            Some(RendererAction::PrevPage) => self.controller.prev_page().await?,
            _ => {}
        }
        Ok(action)
    }

    /// Highlight a selection offered through the new-highlight toolbar.
    /// The view is redrawn even when persisting fails.
    pub async fn confirm_highlight<E: MediaElement>(
        &self,
        view: &mut RenderedPage<E>,
        selection: SelectionPositions,
        color: HighlightColor,
    ) -> Result<Highlight> {
        let result = self
            .controller
            .add_highlight(NewHighlight::from_selection(selection, color))
            .await;
        self.refresh(view);
        result
    }

    /// Delete a highlight offered through the edit toolbar.
    pub async fn delete_highlight<E: MediaElement>(
        &self,
        view: &mut RenderedPage<E>,
        highlight_id: &str,
    ) -> Result<()> {
        let result = self.controller.remove_highlight(highlight_id).await;
        self.refresh(view);
        result
    }

    /// Save progress and stop background work.
    pub async fn close(&self) -> Result<()> {
        tracing::info!(book_id = %self.controller.book_id(), "Closing reader session");
        self.controller.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use crate::mapper::{Selection, TextRuns};
    use crate::position::NormalizedPosition;
    use crate::renderer::{Key, SilentMedia};
    use crate::settings::{MemoryStorage, PdfPageLayout};
    use crate::testing::{FakeBook, FakeStore};
    use std::time::Duration;

    fn backends(book: &Arc<FakeBook>, store: &Arc<FakeStore>) -> SessionBackends {
        SessionBackends {
            pages: book.clone(),
            store: store.clone(),
            settings: Arc::new(MemoryStorage::new()),
        }
    }

    async fn open(book: &Arc<FakeBook>, store: &Arc<FakeStore>) -> ReaderSession {
        ReaderSession::open(
            ControllerOptions::new("book"),
            backends(book, store),
            ReaderConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn first_usable_size_starts_pagination() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;

        session.resize(0.0, 0.0).await.unwrap();
        assert!(book.calls().is_empty());

        session.resize(800.4, 600.0).await.unwrap();
        session.resize(799.6, 600.0).await.unwrap();
        assert_eq!(book.count("info"), 1);
        assert_eq!(session.controller().snapshot().current_page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_from_saved_progress() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        store
            .save_reading_progress("book", NormalizedPosition::new(0.55), 6)
            .await
            .unwrap();
        let session = open(&book, &store).await;

        session.resize(800.0, 600.0).await.unwrap();

        assert_eq!(session.controller().snapshot().current_page, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn layout_settings_repaginate() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;
        session.resize(800.0, 600.0).await.unwrap();

        session
            .update_setting(SettingScope::Global, SettingKey::Theme, "dark".into())
            .await
            .unwrap();
        assert_eq!(book.count("info"), 1);

        let settings = session
            .update_setting(SettingScope::Book, SettingKey::FontSize, 99.into())
            .await
            .unwrap();
        assert_eq!(settings.font_size, 32);
        assert_eq!(book.count("info"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn page_layout_setting_refetches_the_spread() {
        let book = FakeBook::images(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;
        session.resize(1200.0, 800.0).await.unwrap();
        assert!(session.controller().snapshot().right_page.is_some());

        session
            .update_setting(SettingScope::Book, SettingKey::PdfPageLayout, "single".into())
            .await
            .unwrap();

        let state = session.controller().snapshot();
        assert_eq!(session.settings().pdf_page_layout, PdfPageLayout::Single);
        assert!(!state.is_spread_mode);
        assert!(state.right_page.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn keyboard_navigation_moves_the_controller() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;
        session.resize(800.0, 600.0).await.unwrap();

        let mut view = session.render(SilentMedia::default).unwrap().unwrap();
        assert_eq!(view.kind(), ContentKind::Text);
        let action = session
            .handle_input(&mut view, ReaderInput::KeyDown(Key::ArrowRight))
            .await
            .unwrap();

        assert_eq!(action, Some(RendererAction::NextPage));
        assert_eq!(session.controller().snapshot().current_page, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_becomes_a_highlight() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;
        session.resize(800.0, 600.0).await.unwrap();

        let mut view = session.render(SilentMedia::default).unwrap().unwrap();
        let RenderedPage::Text(text) = &view else {
            panic!("expected a text page");
        };
        let first = text.document().text_nodes(text.root())[0];
        let input = ReaderInput::PointerUp {
            selection: Some(Selection::new(first, 0, first, 4)),
            bounds: Some(Rect::new(100.0, 200.0, 50.0, 20.0)),
        };

        let started = tokio::time::Instant::now();
        let action = session.handle_input(&mut view, input).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        let Some(RendererAction::ShowNewHighlightToolbar { selection, .. }) = action else {
            panic!("expected the new highlight toolbar");
        };
        assert_eq!(selection.text, "Page");

        let highlight = session
            .confirm_highlight(&mut view, selection, HighlightColor::Purple)
            .await
            .unwrap();
        assert_eq!(store.highlights.lock().len(), 1);
        let RenderedPage::Text(text) = &view else {
            panic!("expected a text page");
        };
        assert!(text.html().contains(&highlight.id));

        session.delete_highlight(&mut view, &highlight.id).await.unwrap();
        let RenderedPage::Text(text) = &view else {
            panic!("expected a text page");
        };
        assert!(!text.html().contains("<mark"));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_carries_the_new_container_size() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;
        session.resize(800.0, 600.0).await.unwrap();
        let mut view = session.render(SilentMedia::default).unwrap().unwrap();
        let click = ReaderInput::Click {
            x: 1100.0,
            y: 100.0,
            target: None,
            bounds: None,
            has_selection: false,
        };
        assert_eq!(view.handle(&click), None);

        session.resize(1200.0, 800.0).await.unwrap();
        session.refresh(&mut view);
        assert_eq!(view.handle(&click), Some(RendererAction::NextPage));
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_progress() {
        let book = FakeBook::text(10);
        let store = Arc::new(FakeStore::default());
        let session = open(&book, &store).await;
        session.resize(800.0, 600.0).await.unwrap();
        session.controller().go_to_page(4).await.unwrap();

        session.close().await.unwrap();

        let saved = store.saved_progress();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1, 4);
    }
}
