use super::{Key, ReaderInput, RendererAction};
use crate::db::Highlight;
use crate::document::{Document, NodeId};
use crate::error::Result;
use crate::mapper::{self, Selection};
use crate::position::PageSpan;
use crate::toolbar::{Rect, calculate_toolbar_position};

/// Elements that keep their own click behaviour.
pub const INTERACTIVE_ELEMENTS: &[&str] = &["a", "button", "input", "select", "textarea", "label"];

/// Fraction of the content width on each side where a click turns the page.
pub const NAVIGATION_ZONE: f64 = 0.25;

/// A text page: sanitized markup with highlights drawn in.
pub struct TextView {
    document: Document,
    span: PageSpan,
    container: Rect,
}

impl TextView {
    /// Parse and sanitize page markup.
    pub fn new(html: &str, span: PageSpan, container: Rect) -> Result<Self> {
        let mut document = Document::parse(html)?;
        document.sanitize();
        Ok(Self {
            document,
            span,
            container,
        })
    }

    /// The page tree. Selections reported by the host refer to its nodes.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Content root.
    pub fn root(&self) -> NodeId {
        self.document.root()
    }

    /// Positions covered by the page.
    pub fn span(&self) -> PageSpan {
        self.span
    }

    /// Update the container geometry after a resize.
    pub fn set_container(&mut self, container: Rect) {
        self.container = container;
    }

    /// Markup for display.
    pub fn html(&self) -> String {
        self.document.to_html()
    }

    /// Redraw highlight marks.
    pub fn refresh(&mut self, highlights: &[Highlight]) {
        let root = self.document.root();
        mapper::apply_highlights(&mut self.document, root, highlights, self.span);
    }

    /// React to input.
    pub fn handle(&self, input: &ReaderInput) -> Option<RendererAction> {
        match input {
            ReaderInput::KeyDown(key) => match key {
                Key::ArrowLeft | Key::PageUp => Some(RendererAction::PrevPage),
                Key::ArrowRight | Key::PageDown | Key::Space => Some(RendererAction::NextPage),
                Key::Other => None,
            },
            ReaderInput::PointerUp { selection, bounds }
            | ReaderInput::TouchEnd { selection, bounds } => {
                self.selection_action((*selection)?, *bounds)
            }
            ReaderInput::Click {
                x,
                y,
                target,
                bounds,
                has_selection,
            } => self.click_action(*x, *y, *target, *bounds, *has_selection),
        }
    }

    fn selection_action(
        &self,
        selection: Selection<NodeId>,
        bounds: Option<Rect>,
    ) -> Option<RendererAction> {
        let positions =
            mapper::selection_to_positions(&self.document, self.root(), &selection, self.span)?;
        if positions.text.trim().is_empty() {
            return None;
        }
        let target = bounds.unwrap_or(self.container);
        Some(RendererAction::ShowNewHighlightToolbar {
            selection: positions,
            toolbar: calculate_toolbar_position(target, self.container),
        })
    }

    fn click_action(
        &self,
        x: f64,
        y: f64,
        target: Option<NodeId>,
        bounds: Option<Rect>,
        has_selection: bool,
    ) -> Option<RendererAction> {
        if let Some(node) = target {
            if let Some(highlight_id) = mapper::highlight_at(&self.document, node) {
                if has_selection {
                    return None;
                }
                let anchor = bounds.unwrap_or(Rect::new(x, y, 0.0, 0.0));
                return Some(RendererAction::ShowEditToolbar {
                    highlight_id,
                    toolbar: calculate_toolbar_position(anchor, self.container),
                });
            }
            let interactive = self.document.closest(node, |doc, id| {
                doc.element_name(id)
                    .is_some_and(|name| INTERACTIVE_ELEMENTS.contains(&name))
            });
            if interactive.is_some() {
                return None;
            }
        }

        if self.container.width <= 0.0 || !self.container.contains(x, y) {
            return None;
        }
        let relative = (x - self.container.left) / self.container.width;
        if relative < NAVIGATION_ZONE {
            Some(RendererAction::PrevPage)
        } else if relative > 1.0 - NAVIGATION_ZONE {
            Some(RendererAction::NextPage)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::HighlightColor;
    use crate::mapper::TextRuns;
    use crate::position::NormalizedPosition;

    const PAGE: &str = "<p>Call me <a href=\"#n\">Ishmael</a>. Some years ago, never mind how long.</p>";

    fn view() -> TextView {
        TextView::new(
            PAGE,
            PageSpan::new(0.1, 0.2),
            Rect::new(0.0, 0.0, 800.0, 600.0),
        )
        .unwrap()
    }

    fn click(x: f64, target: Option<NodeId>, has_selection: bool) -> ReaderInput {
        ReaderInput::Click {
            x,
            y: 300.0,
            target,
            bounds: None,
            has_selection,
        }
    }

    fn highlight(id: &str, start: f64, end: f64) -> Highlight {
        Highlight {
            id: id.to_string(),
            book_id: "b".to_string(),
            start_position: NormalizedPosition::new(start),
            end_position: NormalizedPosition::new(end),
            text: String::new(),
            note: None,
            color: HighlightColor::Blue,
            created_at: 0,
        }
    }

    #[test]
    fn keys_navigate() {
        let v = view();
        let key = |k| v.handle(&ReaderInput::KeyDown(k));
        assert_eq!(key(Key::ArrowLeft), Some(RendererAction::PrevPage));
        assert_eq!(key(Key::PageUp), Some(RendererAction::PrevPage));
        assert_eq!(key(Key::ArrowRight), Some(RendererAction::NextPage));
        assert_eq!(key(Key::Space), Some(RendererAction::NextPage));
        assert_eq!(key(Key::PageDown), Some(RendererAction::NextPage));
        assert_eq!(key(Key::Other), None);
    }

    #[test]
    fn click_zones_turn_pages() {
        let v = view();
        assert_eq!(v.handle(&click(100.0, None, false)), Some(RendererAction::PrevPage));
        assert_eq!(v.handle(&click(700.0, None, false)), Some(RendererAction::NextPage));
        assert_eq!(v.handle(&click(400.0, None, false)), None);
    }

    #[test]
    fn clicks_follow_the_resized_container() {
        let mut v = view();
        assert_eq!(v.handle(&click(900.0, None, false)), None);

        v.set_container(Rect::new(0.0, 0.0, 1000.0, 600.0));
        assert_eq!(v.handle(&click(900.0, None, false)), Some(RendererAction::NextPage));
        assert_eq!(v.handle(&click(700.0, None, false)), None);
    }

    #[test]
    fn clicks_on_links_do_not_navigate() {
        let v = view();
        let link_text = v.document().text_nodes(v.root())[1];
        assert_eq!(v.document().text(link_text), Some("Ishmael"));
        assert_eq!(v.handle(&click(10.0, Some(link_text), false)), None);
    }

    #[test]
    fn selection_offers_the_new_highlight_toolbar() {
        let v = view();
        let first = v.document().text_nodes(v.root())[0];
        let input = ReaderInput::PointerUp {
            selection: Some(Selection::new(first, 0, first, 4)),
            bounds: Some(Rect::new(100.0, 200.0, 60.0, 20.0)),
        };

        let Some(RendererAction::ShowNewHighlightToolbar { selection, toolbar }) = v.handle(&input)
        else {
            panic!("expected the new highlight toolbar");
        };
        assert_eq!(selection.text, "Call");
        assert!(selection.start_position.value() >= 0.1);
        assert!(selection.end_position <= NormalizedPosition::new(0.2));
        assert!(toolbar.above);
    }

    #[test]
    fn collapsed_or_missing_selection_does_nothing() {
        let v = view();
        let first = v.document().text_nodes(v.root())[0];
        let collapsed = ReaderInput::TouchEnd {
            selection: Some(Selection::new(first, 2, first, 2)),
            bounds: None,
        };
        assert_eq!(v.handle(&collapsed), None);
        let missing = ReaderInput::PointerUp {
            selection: None,
            bounds: None,
        };
        assert_eq!(v.handle(&missing), None);
    }

    #[test]
    fn clicking_a_mark_opens_the_edit_toolbar() {
        let mut v = view();
        v.refresh(&[highlight("h1", 0.1, 0.2)]);
        let marked = v.document().text_nodes(v.root())[0];

        match v.handle(&click(10.0, Some(marked), false)) {
            Some(RendererAction::ShowEditToolbar { highlight_id, .. }) => {
                assert_eq!(highlight_id, "h1")
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(v.handle(&click(10.0, Some(marked), true)), None);
    }

    #[test]
    fn refresh_redraws_marks() {
        let mut v = view();
        v.refresh(&[highlight("h1", 0.1, 0.2)]);
        assert!(v.html().contains("data-highlight-id=\"h1\""));

        v.refresh(&[]);
        assert!(!v.html().contains("<mark"));
    }

    #[test]
    fn scripts_are_stripped() {
        let v = TextView::new(
            "<p onclick=\"x()\">Hi<script>alert(1)</script></p>",
            PageSpan::new(0.0, 0.1),
            Rect::default(),
        )
        .unwrap();
        assert_eq!(v.html(), "<p>Hi</p>");
    }
}
