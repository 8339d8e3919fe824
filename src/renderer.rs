//! Views for displayed pages and the input they understand.

mod audio;
mod image;
mod text;

pub use audio::{AudioView, MediaElement, SKIP_BACK_SECONDS, SKIP_FORWARD_SECONDS, SilentMedia};
pub use image::{ImageLoadState, ImageSlot, ImageView};
pub use text::{INTERACTIVE_ELEMENTS, NAVIGATION_ZONE, TextView};

use crate::config::ReaderConfig;
use crate::content::{ContentKind, PageBody, PageContent};
use crate::db::Highlight;
use crate::document::NodeId;
use crate::error::Result;
use crate::mapper::{Selection, SelectionPositions};
use crate::settings::ReaderSettings;
use crate::toolbar::{Rect, ToolbarPosition};
use std::time::Duration;

/// Keys the reader reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Left arrow.
    ArrowLeft,
    /// Right arrow.
    ArrowRight,
    /// Space bar.
    Space,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Anything else.
    Other,
}

/// Input forwarded by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderInput {
    /// A key was pressed.
    KeyDown(Key),
    /// Mouse button released, with the selection at that moment.
    PointerUp {
        /// Current selection.
        selection: Option<Selection<NodeId>>,
        /// Bounding box of the selection.
        bounds: Option<Rect>,
    },
    /// Touch ended, with the selection at that moment.
    TouchEnd {
        /// Current selection.
        selection: Option<Selection<NodeId>>,
        /// Bounding box of the selection.
        bounds: Option<Rect>,
    },
    /// Click or tap.
    Click {
        /// Horizontal viewport coordinate.
        x: f64,
        /// Vertical viewport coordinate.
        y: f64,
        /// Node under the pointer.
        target: Option<NodeId>,
        /// Bounding box of the clicked element.
        bounds: Option<Rect>,
        /// Whether a non-collapsed selection exists.
        has_selection: bool,
    },
}

/// What the host should do in response to input.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererAction {
    /// Go to the next page.
    NextPage,
    /// Go to the previous page.
    PrevPage,
    /// Offer to highlight the selection.
    ShowNewHighlightToolbar {
        /// Selection in position space.
        selection: SelectionPositions,
        /// Toolbar placement.
        toolbar: ToolbarPosition,
    },
    /// Offer to edit or delete an existing highlight.
    ShowEditToolbar {
        /// Clicked highlight.
        highlight_id: String,
        /// Toolbar placement.
        toolbar: ToolbarPosition,
    },
}

/// How long to wait after a selection gesture before reading the selection.
/// Touch platforms finalize selections later than mice.
pub fn selection_settle_delay(input: &ReaderInput, config: &ReaderConfig) -> Option<Duration> {
    match input {
        ReaderInput::PointerUp { .. } => Some(Duration::from_millis(config.pointer_settle_ms)),
        ReaderInput::TouchEnd { .. } => Some(Duration::from_millis(config.touch_settle_ms)),
        ReaderInput::KeyDown(_) | ReaderInput::Click { .. } => None,
    }
}

/// The view of the displayed page.
pub enum RenderedPage<E: MediaElement> {
    /// Reflowable text.
    Text(TextView),
    /// One image or a spread.
    Image(ImageView),
    /// Audio player.
    Audio(AudioView<E>),
}

impl<E: MediaElement> RenderedPage<E> {
    /// Build the view for `content`.
    ///
    /// `right` is the second page of an image spread. `media` is only called
    /// for audio content.
    pub fn build(
        content: &PageContent,
        right: Option<&PageContent>,
        settings: &ReaderSettings,
        container: Rect,
        highlights: &[Highlight],
        media: impl FnOnce() -> E,
    ) -> Result<Self> {
        let page = match &content.body {
            PageBody::Text { html } => {
                let mut view = TextView::new(html, content.span(), container)?;
                view.refresh(highlights);
                RenderedPage::Text(view)
            }
            PageBody::Image { image_url } => {
                let right_url = right.and_then(PageContent::image_url);
                RenderedPage::Image(ImageView::new(image_url, right_url, settings, container))
            }
            PageBody::Audio {
                audio_url,
                start_time,
                end_time,
            } => RenderedPage::Audio(AudioView::new(
                media(),
                audio_url,
                *start_time,
                *end_time,
                settings,
            )),
        };
        Ok(page)
    }

    /// Content type shown.
    pub fn kind(&self) -> ContentKind {
        match self {
            RenderedPage::Text(_) => ContentKind::Text,
            RenderedPage::Image(_) => ContentKind::Image,
            RenderedPage::Audio(_) => ContentKind::Audio,
        }
    }

    /// React to input.
    pub fn handle(&mut self, input: &ReaderInput) -> Option<RendererAction> {
        match self {
            RenderedPage::Text(view) => view.handle(input),
            RenderedPage::Image(view) => view.handle(input),
            RenderedPage::Audio(view) => view.handle(input),
        }
    }

    /// Update the container geometry after a resize.
    pub fn set_container(&mut self, container: Rect) {
        match self {
            RenderedPage::Text(view) => view.set_container(container),
            RenderedPage::Image(view) => view.set_container(container),
            RenderedPage::Audio(_) => {}
        }
    }

    /// Bring the view up to date with new highlights or settings.
    pub fn refresh(&mut self, highlights: &[Highlight], settings: &ReaderSettings) {
        match self {
            RenderedPage::Text(view) => view.refresh(highlights),
            RenderedPage::Image(view) => view.apply_settings(settings),
            RenderedPage::Audio(view) => view.apply_settings(settings),
        }
    }
}
