//! Annotation mutations as replayable commands.

use crate::backend::AnnotationStore;
use crate::db::{Bookmark, Highlight, HighlightColor};
use crate::error::Result;

/// One highlight or bookmark mutation.
///
/// Commands are applied to the in-memory lists immediately and then sent to
/// the [`AnnotationStore`]. A command whose send fails is kept so it can be
/// replayed later.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationCommand {
    /// Create a highlight.
    AddHighlight(Highlight),
    /// Delete a highlight.
    RemoveHighlight {
        /// Highlight ID.
        id: String,
    },
    /// Change a highlight's colour.
    UpdateHighlightColor {
        /// Highlight ID.
        id: String,
        /// New colour.
        color: HighlightColor,
    },
    /// Replace a highlight's note.
    UpdateHighlightNote {
        /// Highlight ID.
        id: String,
        /// New note; `None` clears it.
        note: Option<String>,
    },
    /// Create a bookmark.
    AddBookmark(Bookmark),
    /// Delete a bookmark.
    RemoveBookmark {
        /// Bookmark ID.
        id: String,
    },
}

impl AnnotationCommand {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationCommand::AddHighlight(_) => "add-highlight",
            AnnotationCommand::RemoveHighlight { .. } => "remove-highlight",
            AnnotationCommand::UpdateHighlightColor { .. } => "update-highlight-color",
            AnnotationCommand::UpdateHighlightNote { .. } => "update-highlight-note",
            AnnotationCommand::AddBookmark(_) => "add-bookmark",
            AnnotationCommand::RemoveBookmark { .. } => "remove-bookmark",
        }
    }

    /// ID of the highlight or bookmark the command targets.
    pub fn target_id(&self) -> &str {
        match self {
            AnnotationCommand::AddHighlight(h) => &h.id,
            AnnotationCommand::AddBookmark(b) => &b.id,
            AnnotationCommand::RemoveHighlight { id }
            | AnnotationCommand::UpdateHighlightColor { id, .. }
            | AnnotationCommand::UpdateHighlightNote { id, .. }
            | AnnotationCommand::RemoveBookmark { id } => id,
        }
    }

    fn is_add(&self) -> bool {
        matches!(
            self,
            AnnotationCommand::AddHighlight(_) | AnnotationCommand::AddBookmark(_)
        )
    }

    /// Fold this command into queued commands for the same target.
    ///
    /// A remove drops everything queued for its target; when the queue still
    /// held the unsaved add there is nothing left to send. An update folds
    /// into a queued add, and otherwise replaces queued updates of the same
    /// kind.
    /// Returns `true` when the store needs no call.
    pub(super) fn coalesce(&self, queued: &mut Vec<AnnotationCommand>) -> bool {
        let id = self.target_id();
        let pending_add = queued
            .iter()
            .position(|c| c.is_add() && c.target_id() == id);

        match self {
            AnnotationCommand::AddHighlight(_) | AnnotationCommand::AddBookmark(_) => false,
            AnnotationCommand::RemoveHighlight { .. } | AnnotationCommand::RemoveBookmark { .. } => {
                queued.retain(|c| c.target_id() != id);
                pending_add.is_some()
            }
            AnnotationCommand::UpdateHighlightColor { color, .. } => {
                if let Some(i) = pending_add
                    && let AnnotationCommand::AddHighlight(h) = &mut queued[i]
                {
                    h.color = *color;
                    return true;
                }
                queued.retain(|c| !(c.target_id() == id && c.name() == self.name()));
                false
            }
            AnnotationCommand::UpdateHighlightNote { note, .. } => {
                if let Some(i) = pending_add
                    && let AnnotationCommand::AddHighlight(h) = &mut queued[i]
                {
                    h.note = note.clone();
                    return true;
                }
                queued.retain(|c| !(c.target_id() == id && c.name() == self.name()));
                false
            }
        }
    }

    pub(super) fn apply(&self, highlights: &mut Vec<Highlight>, bookmarks: &mut Vec<Bookmark>) {
        match self {
            AnnotationCommand::AddHighlight(highlight) => {
                highlights.retain(|h| h.id != highlight.id);
                highlights.push(highlight.clone());
            }
            AnnotationCommand::RemoveHighlight { id } => highlights.retain(|h| &h.id != id),
            AnnotationCommand::UpdateHighlightColor { id, color } => {
                if let Some(h) = highlights.iter_mut().find(|h| &h.id == id) {
                    h.color = *color;
                }
            }
            AnnotationCommand::UpdateHighlightNote { id, note } => {
                if let Some(h) = highlights.iter_mut().find(|h| &h.id == id) {
                    h.note = note.clone();
                }
            }
            AnnotationCommand::AddBookmark(bookmark) => {
                bookmarks.retain(|b| b.id != bookmark.id);
                bookmarks.push(bookmark.clone());
            }
            AnnotationCommand::RemoveBookmark { id } => bookmarks.retain(|b| &b.id != id),
        }
    }

    pub(super) async fn send(&self, store: &dyn AnnotationStore) -> Result<()> {
        match self {
            AnnotationCommand::AddHighlight(h) => store.add_highlight(h).await,
            AnnotationCommand::RemoveHighlight { id } => store.delete_highlight(id).await,
            AnnotationCommand::UpdateHighlightColor { id, color } => {
                store.update_highlight_color(id, *color).await
            }
            AnnotationCommand::UpdateHighlightNote { id, note } => {
                store.update_highlight_note(id, note.as_deref()).await
            }
            AnnotationCommand::AddBookmark(b) => store.add_bookmark(b).await,
            AnnotationCommand::RemoveBookmark { id } => store.delete_bookmark(id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_timestamp;
    use crate::position::NormalizedPosition;

    fn add(id: &str) -> AnnotationCommand {
        AnnotationCommand::AddHighlight(Highlight {
            id: id.to_string(),
            book_id: "book".to_string(),
            start_position: NormalizedPosition::new(0.1),
            end_position: NormalizedPosition::new(0.2),
            text: "text".to_string(),
            note: None,
            color: HighlightColor::Yellow,
            created_at: now_timestamp(),
        })
    }

    #[test]
    fn remove_cancels_a_queued_add() {
        let mut queued = vec![add("a"), add("b")];
        let remove = AnnotationCommand::RemoveHighlight { id: "a".to_string() };

        assert!(remove.coalesce(&mut queued));
        assert_eq!(queued, vec![add("b")]);
    }

    #[test]
    fn remove_of_a_stored_highlight_is_still_sent() {
        let mut queued = vec![AnnotationCommand::UpdateHighlightColor {
            id: "a".to_string(),
            color: HighlightColor::Blue,
        }];
        let remove = AnnotationCommand::RemoveHighlight { id: "a".to_string() };

        assert!(!remove.coalesce(&mut queued));
        assert!(queued.is_empty());
    }

    #[test]
    fn updates_fold_into_a_queued_add() {
        let mut queued = vec![add("a")];
        let color = AnnotationCommand::UpdateHighlightColor {
            id: "a".to_string(),
            color: HighlightColor::Pink,
        };
        let note = AnnotationCommand::UpdateHighlightNote {
            id: "a".to_string(),
            note: Some("later".to_string()),
        };

        assert!(color.coalesce(&mut queued));
        assert!(note.coalesce(&mut queued));
        let AnnotationCommand::AddHighlight(h) = &queued[0] else {
            panic!("expected the queued add");
        };
        assert_eq!(h.color, HighlightColor::Pink);
        assert_eq!(h.note.as_deref(), Some("later"));
    }

    #[test]
    fn newer_update_replaces_a_queued_one() {
        let mut queued = vec![
            AnnotationCommand::UpdateHighlightNote {
                id: "a".to_string(),
                note: Some("old".to_string()),
            },
            AnnotationCommand::UpdateHighlightColor {
                id: "a".to_string(),
                color: HighlightColor::Blue,
            },
        ];
        let note = AnnotationCommand::UpdateHighlightNote {
            id: "a".to_string(),
            note: Some("new".to_string()),
        };

        assert!(!note.coalesce(&mut queued));
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].name(), "update-highlight-color");
    }
}
