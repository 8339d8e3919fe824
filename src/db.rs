mod schema;

pub use schema::Database;

use crate::position::{NormalizedPosition, PositionRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highlight colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    /// Default colour.
    #[default]
    Yellow,
    /// Green.
    Green,
    /// Blue.
    Blue,
    /// Pink.
    Pink,
    /// Purple.
    Purple,
}

impl HighlightColor {
    /// All colours, in toolbar order.
    pub const ALL: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Purple,
    ];

    /// Lowercase name used in storage and markup.
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Purple => "purple",
        }
    }
}

impl FromStr for HighlightColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown highlight color: {}", s))
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highlighted passage in a book, independent of pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    /// Highlight ID.
    pub id: String,
    /// Book ID.
    pub book_id: String,
    /// Inclusive start position.
    pub start_position: NormalizedPosition,
    /// Exclusive end position.
    pub end_position: NormalizedPosition,
    /// Snapshot of the selected text.
    pub text: String,
    /// User note.
    pub note: Option<String>,
    /// Highlight colour.
    pub color: HighlightColor,
    /// Creation timestamp.
    pub created_at: i64,
}

impl Highlight {
    /// Position range covered by the highlight.
    pub fn range(&self) -> PositionRange {
        PositionRange {
            start: self.start_position,
            end: self.end_position,
        }
    }
}

/// Bookmark in a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    /// Bookmark ID.
    pub id: String,
    /// Book ID.
    pub book_id: String,
    /// Bookmarked position.
    pub position: NormalizedPosition,
    /// Page number when the bookmark was taken (advisory only).
    pub page_number: Option<u32>,
    /// Bookmark title.
    pub title: Option<String>,
    /// User note.
    pub note: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Last saved reading position for a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    /// Book ID.
    pub book_id: String,
    /// Position in the work.
    pub position: NormalizedPosition,
    /// Page number under the viewport used when saving.
    pub page_number: u32,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
