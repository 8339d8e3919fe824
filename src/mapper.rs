//! Conversion between on-screen text selections and normalized positions,
//! and re-application of stored highlights onto rendered page markup.
//!
//! Traversal goes through two narrow traits: [`TextRuns`] enumerates text
//! nodes in document order, [`MarkTarget`] adds the three mutations needed to
//! draw marks. [`Document`] implements both; any other document model can be
//! plugged in the same way.

use crate::db::{Highlight, HighlightColor};
use crate::document::{Document, NodeId};
use crate::position::{
    NormalizedPosition, PageSpan, char_to_position, clamp_to_span, overlaps, range_to_chars,
};
use serde::Serialize;

/// Tag of mark elements.
pub const MARK_TAG: &str = "mark";
/// Attribute carrying the highlight id on a mark.
pub const HIGHLIGHT_ID_ATTR: &str = "data-highlight-id";
/// Attribute carrying the highlight colour on a mark.
pub const HIGHLIGHT_COLOR_ATTR: &str = "data-color";
/// Class shared by every mark.
pub const MARK_CLASS: &str = "reader-highlight";

/// Read-only access to the text of a document.
pub trait TextRuns {
    /// Node handle.
    type Node: Copy + Eq;

    /// Text nodes beneath `root`, in document order.
    fn text_nodes(&self, root: Self::Node) -> Vec<Self::Node>;

    /// Text of a text node.
    fn node_text(&self, node: Self::Node) -> &str;
}

/// Identity of a mark to draw.
#[derive(Debug, Clone, Copy)]
pub struct MarkSpec<'a> {
    /// Highlight id.
    pub highlight_id: &'a str,
    /// Highlight colour.
    pub color: HighlightColor,
}

/// Mutations needed to draw highlight marks.
pub trait MarkTarget: TextRuns {
    /// Unwrap every mark beneath `root` and merge adjacent text.
    fn clear_marks(&mut self, root: Self::Node);

    /// Whether a text node already sits inside a mark.
    fn is_marked(&self, node: Self::Node) -> bool;

    /// Wrap characters `[start, end)` of a text node in a mark, splitting the
    /// node as needed.
    fn wrap(&mut self, node: Self::Node, start: usize, end: usize, mark: &MarkSpec<'_>);
}

/// One end of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary<N> {
    /// Text node.
    pub node: N,
    /// Character offset inside the node.
    pub offset: usize,
}

/// A text selection as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<N> {
    /// Where the selection started.
    pub anchor: Boundary<N>,
    /// Where the selection ended; may precede the anchor.
    pub focus: Boundary<N>,
}

impl<N: Copy + Eq> Selection<N> {
    /// Selection between two boundaries.
    pub fn new(anchor_node: N, anchor_offset: usize, focus_node: N, focus_offset: usize) -> Self {
        Self {
            anchor: Boundary {
                node: anchor_node,
                offset: anchor_offset,
            },
            focus: Boundary {
                node: focus_node,
                offset: focus_offset,
            },
        }
    }

    /// Whether the selection covers nothing.
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A selection expressed in pagination-independent coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPositions {
    /// Start position.
    pub start_position: NormalizedPosition,
    /// End position.
    pub end_position: NormalizedPosition,
    /// Selected text.
    pub text: String,
}

/// Map a selection inside `root` to normalized positions by linear
/// interpolation over the page span.
///
/// Returns `None` when the selection is collapsed, not contained in `root`,
/// `root` has no text, or the span is empty.
pub fn selection_to_positions<T: TextRuns>(
    doc: &T,
    root: T::Node,
    selection: &Selection<T::Node>,
    span: PageSpan,
) -> Option<SelectionPositions> {
    if selection.is_collapsed() || span.is_empty() {
        return None;
    }

    let mut anchor = None;
    let mut focus = None;
    let mut full_text = String::new();
    let mut total = 0usize;
    for node in doc.text_nodes(root) {
        let text = doc.node_text(node);
        let len = text.chars().count();
        if node == selection.anchor.node {
            anchor = Some(total + selection.anchor.offset.min(len));
        }
        if node == selection.focus.node {
            focus = Some(total + selection.focus.offset.min(len));
        }
        full_text.push_str(text);
        total += len;
    }

    let (anchor, focus) = (anchor?, focus?);
    let (start, end) = if anchor <= focus {
        (anchor, focus)
    } else {
        (focus, anchor)
    };
    if start == end {
        return None;
    }

    let start_position = char_to_position(start, total, span)?;
    let end_position = char_to_position(end, total, span)?;
    if start_position >= end_position {
        return None;
    }

    Some(SelectionPositions {
        start_position,
        end_position,
        text: full_text.chars().skip(start).take(end - start).collect(),
    })
}

/// Redraw highlight marks for one page.
///
/// Existing marks are removed first, so repeated calls with the same inputs
/// produce the same tree. Highlights are drawn in ascending start order; a
/// text fragment that is already marked is not wrapped again, so on overlap
/// the earlier highlight is the one drawn.
pub fn apply_highlights<T: MarkTarget>(
    doc: &mut T,
    root: T::Node,
    highlights: &[Highlight],
    span: PageSpan,
) {
    doc.clear_marks(root);
    if span.is_empty() {
        return;
    }

    let mut visible: Vec<&Highlight> = highlights
        .iter()
        .filter(|h| overlaps(h.range(), span))
        .collect();
    visible.sort_by(|a, b| {
        a.start_position
            .total_cmp(&b.start_position)
            .then_with(|| a.id.cmp(&b.id))
    });

    for highlight in visible {
        let runs: Vec<(T::Node, usize, usize)> = {
            let mut offset = 0;
            doc.text_nodes(root)
                .into_iter()
                .map(|node| {
                    let len = doc.node_text(node).chars().count();
                    let run = (node, offset, len);
                    offset += len;
                    run
                })
                .collect()
        };
        let total: usize = runs.iter().map(|(_, _, len)| len).sum();
        let clamped = clamp_to_span(highlight.range(), span);
        let Some((start, end)) = range_to_chars(clamped, total, span) else {
            tracing::trace!(id = %highlight.id, "Highlight collapses on this page, skipping");
            continue;
        };

        let mark = MarkSpec {
            highlight_id: &highlight.id,
            color: highlight.color,
        };
        // Back to front: wrapping splits the current node only, so offsets
        // of the nodes still to visit stay valid.
        for &(node, run_start, len) in runs.iter().rev() {
            let run_end = run_start + len;
            if len == 0 || run_end <= start || run_start >= end {
                continue;
            }
            if doc.is_marked(node) {
                continue;
            }
            let local_start = start.max(run_start) - run_start;
            let local_end = end.min(run_end) - run_start;
            doc.wrap(node, local_start, local_end, &mark);
        }
    }
}

fn is_mark(doc: &Document, id: NodeId) -> bool {
    doc.element_name(id) == Some(MARK_TAG) && doc.attr(id, HIGHLIGHT_ID_ATTR).is_some()
}

/// Id of the highlight drawn at `node`, if any.
pub fn highlight_at(doc: &Document, node: NodeId) -> Option<String> {
    let mark = doc.closest(node, is_mark)?;
    doc.attr(mark, HIGHLIGHT_ID_ATTR).map(str::to_string)
}

/// Text drawn for a highlight beneath `root`.
pub fn extract_marked_text(doc: &Document, root: NodeId, highlight_id: &str) -> String {
    doc.descendants(root)
        .into_iter()
        .filter(|&n| is_mark(doc, n) && doc.attr(n, HIGHLIGHT_ID_ATTR) == Some(highlight_id))
        .map(|n| doc.text_content(n))
        .collect()
}

/// Every mark element beneath `root`, in document order.
pub fn marks(doc: &Document, root: NodeId) -> Vec<NodeId> {
    doc.descendants(root)
        .into_iter()
        .filter(|&n| is_mark(doc, n))
        .collect()
}

fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

impl TextRuns for Document {
    type Node = NodeId;

    fn text_nodes(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&n| self.text(n).is_some())
            .collect()
    }

    fn node_text(&self, node: NodeId) -> &str {
        self.text(node).unwrap_or("")
    }
}

impl MarkTarget for Document {
    fn clear_marks(&mut self, root: NodeId) {
        for mark in marks(self, root).into_iter().rev() {
            self.unwrap_element(mark);
        }
        self.normalize(root);
        if root == self.root() {
            self.compact();
        }
    }

    fn is_marked(&self, node: NodeId) -> bool {
        self.parent(node).is_some_and(|p| is_mark(self, p))
    }

    fn wrap(&mut self, node: NodeId, start: usize, end: usize, mark: &MarkSpec<'_>) {
        let Some(text) = self.text(node).map(str::to_string) else {
            return;
        };
        let (start_byte, end_byte) = (byte_index(&text, start), byte_index(&text, end));
        if start_byte >= end_byte {
            return;
        }

        let element = self.create_element(
            MARK_TAG,
            vec![
                (
                    "class".to_string(),
                    format!("{} highlight-{}", MARK_CLASS, mark.color),
                ),
                (HIGHLIGHT_ID_ATTR.to_string(), mark.highlight_id.to_string()),
                (HIGHLIGHT_COLOR_ATTR.to_string(), mark.color.to_string()),
            ],
        );
        self.insert_before(node, element);
        if start_byte > 0 {
            let before = self.create_text(&text[..start_byte]);
            self.insert_before(element, before);
        }
        if end_byte < text.len() {
            let after = self.create_text(&text[end_byte..]);
            self.insert_after(element, after);
        }
        self.set_text(node, &text[start_byte..end_byte]);
        self.append_child(element, node);
    }
}
