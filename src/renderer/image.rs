use super::{Key, ReaderInput, RendererAction};
use crate::settings::{ComicFitMode, ReaderSettings, ReadingDirection};
use crate::toolbar::Rect;

/// Load state of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLoadState {
    /// Not decoded yet.
    Loading,
    /// Ready to show.
    Loaded,
    /// Could not be loaded.
    Failed,
}

/// One displayed image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSlot {
    /// Image location.
    pub url: String,
    /// Load state.
    pub state: ImageLoadState,
    /// Intrinsic height once known.
    pub natural_height: Option<u32>,
}

impl ImageSlot {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            state: ImageLoadState::Loading,
            natural_height: None,
        }
    }
}

/// A comic or PDF page, or a two-page spread.
#[derive(Debug, Clone)]
pub struct ImageView {
    left: ImageSlot,
    right: Option<ImageSlot>,
    fit_mode: ComicFitMode,
    direction: ReadingDirection,
    container: Rect,
}

impl ImageView {
    /// View for `url`, with `right_url` as the second page of a spread.
    pub fn new(
        url: &str,
        right_url: Option<&str>,
        settings: &ReaderSettings,
        container: Rect,
    ) -> Self {
        Self {
            left: ImageSlot::new(url),
            right: right_url.map(ImageSlot::new),
            fit_mode: settings.comic_fit_mode,
            direction: settings.reading_direction,
            container,
        }
    }

    /// Whether two pages are shown.
    pub fn is_spread(&self) -> bool {
        self.right.is_some()
    }

    /// Fit mode in effect.
    pub fn fit_mode(&self) -> ComicFitMode {
        self.fit_mode
    }

    /// Reading direction in effect.
    pub fn direction(&self) -> ReadingDirection {
        self.direction
    }

    /// Slots in on-screen order; right-to-left spreads put the second page
    /// on the left.
    pub fn display_order(&self) -> Vec<&ImageSlot> {
        let mut slots: Vec<&ImageSlot> = std::iter::once(&self.left).chain(&self.right).collect();
        if self.direction == ReadingDirection::Rtl {
            slots.reverse();
        }
        slots
    }

    /// Whether every image is either loaded or failed.
    pub fn is_settled(&self) -> bool {
        std::iter::once(&self.left)
            .chain(&self.right)
            .all(|s| s.state != ImageLoadState::Loading)
    }

    /// Report an image element as mounted. An image that is already complete
    /// with a known height came from the cache and never fires a load event,
    /// so it is marked loaded right away.
    pub fn register_image(&mut self, url: &str, complete: bool, natural_height: u32) {
        if let Some(slot) = self.slot_mut(url) {
            if complete && natural_height > 0 {
                slot.state = ImageLoadState::Loaded;
                slot.natural_height = Some(natural_height);
            }
        }
    }

    /// Load event.
    pub fn image_loaded(&mut self, url: &str, natural_height: u32) {
        if let Some(slot) = self.slot_mut(url) {
            slot.state = ImageLoadState::Loaded;
            slot.natural_height = Some(natural_height);
        }
    }

    /// Error event.
    pub fn image_failed(&mut self, url: &str) {
        if let Some(slot) = self.slot_mut(url) {
            tracing::warn!(url, "Failed to load page image");
            slot.state = ImageLoadState::Failed;
        }
    }

    fn slot_mut(&mut self, url: &str) -> Option<&mut ImageSlot> {
        std::iter::once(&mut self.left)
            .chain(self.right.as_mut())
            .find(|s| s.url == url)
    }

    /// Update the container geometry after a resize.
    pub fn set_container(&mut self, container: Rect) {
        self.container = container;
    }

    /// Pick up fit mode and reading direction.
    pub fn apply_settings(&mut self, settings: &ReaderSettings) {
        self.fit_mode = settings.comic_fit_mode;
        self.direction = settings.reading_direction;
    }

    /// React to input.
    pub fn handle(&self, input: &ReaderInput) -> Option<RendererAction> {
        match input {
            ReaderInput::KeyDown(Key::ArrowLeft | Key::PageUp) => Some(RendererAction::PrevPage),
            ReaderInput::KeyDown(Key::ArrowRight | Key::PageDown | Key::Space) => {
                Some(RendererAction::NextPage)
            }
            ReaderInput::Click { x, y, .. } => {
                if self.container.width <= 0.0 || !self.container.contains(*x, *y) {
                    return None;
                }
                let left_half = x - self.container.left < self.container.width / 2.0;
                let backwards = left_half != (self.direction == ReadingDirection::Rtl);
                Some(if backwards {
                    RendererAction::PrevPage
                } else {
                    RendererAction::NextPage
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(right: Option<&str>, direction: ReadingDirection) -> ImageView {
        let settings = ReaderSettings {
            reading_direction: direction,
            ..ReaderSettings::default()
        };
        ImageView::new(
            "/p/1.jpg",
            right,
            &settings,
            Rect::new(0.0, 0.0, 1000.0, 800.0),
        )
    }

    fn click(x: f64) -> ReaderInput {
        ReaderInput::Click {
            x,
            y: 400.0,
            target: None,
            bounds: None,
            has_selection: false,
        }
    }

    #[test]
    fn click_halves_navigate() {
        let v = view(None, ReadingDirection::Ltr);
        assert_eq!(v.handle(&click(200.0)), Some(RendererAction::PrevPage));
        assert_eq!(v.handle(&click(800.0)), Some(RendererAction::NextPage));
    }

    #[test]
    fn clicks_outside_the_container_are_ignored() {
        let mut v = view(None, ReadingDirection::Ltr);
        assert_eq!(v.handle(&click(1200.0)), None);

        v.set_container(Rect::new(0.0, 0.0, 1600.0, 800.0));
        assert_eq!(v.handle(&click(1200.0)), Some(RendererAction::NextPage));
        assert_eq!(v.handle(&click(700.0)), Some(RendererAction::PrevPage));
    }

    #[test]
    fn right_to_left_inverts_clicks_and_spread_order() {
        let v = view(Some("/p/2.jpg"), ReadingDirection::Rtl);
        assert_eq!(v.handle(&click(200.0)), Some(RendererAction::NextPage));
        assert_eq!(v.handle(&click(800.0)), Some(RendererAction::PrevPage));

        let order: Vec<&str> = v.display_order().iter().map(|s| s.url.as_str()).collect();
        assert_eq!(order, ["/p/2.jpg", "/p/1.jpg"]);
    }

    #[test]
    fn cached_images_are_loaded_on_registration() {
        let mut v = view(Some("/p/2.jpg"), ReadingDirection::Ltr);
        v.register_image("/p/1.jpg", true, 1600);
        v.register_image("/p/2.jpg", false, 0);
        assert!(!v.is_settled());

        v.image_failed("/p/2.jpg");
        assert!(v.is_settled());
        assert_eq!(v.display_order()[0].natural_height, Some(1600));
        assert_eq!(v.display_order()[1].state, ImageLoadState::Failed);
    }

    #[test]
    fn complete_images_without_height_keep_loading() {
        let mut v = view(None, ReadingDirection::Ltr);
        v.register_image("/p/1.jpg", true, 0);
        assert_eq!(v.display_order()[0].state, ImageLoadState::Loading);

        v.image_loaded("/p/1.jpg", 900);
        assert_eq!(v.display_order()[0].state, ImageLoadState::Loaded);
    }

    #[test]
    fn settings_update_fit_and_direction() {
        let mut v = view(None, ReadingDirection::Ltr);
        let settings = ReaderSettings {
            comic_fit_mode: ComicFitMode::Width,
            reading_direction: ReadingDirection::Rtl,
            ..ReaderSettings::default()
        };
        v.apply_settings(&settings);
        assert_eq!(v.fit_mode(), ComicFitMode::Width);
        assert_eq!(v.direction(), ReadingDirection::Rtl);
    }
}
