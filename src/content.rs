//! Page content produced by the pagination backend.

use crate::position::{NormalizedPosition, PageSpan};
use serde::{Deserialize, Serialize};

/// Chapter the page belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInfo {
    /// Chapter title.
    pub title: Option<String>,
    /// Zero-based chapter index.
    pub index: Option<u32>,
}

/// Type-specific payload of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum PageBody {
    /// Reflowable text as an HTML fragment.
    Text {
        /// Page markup.
        html: String,
    },
    /// A fixed image (comic page, rendered PDF page).
    Image {
        /// Image location.
        image_url: String,
    },
    /// A slice of an audiobook.
    Audio {
        /// Audio location.
        audio_url: String,
        /// Offset in seconds where the page starts.
        start_time: Option<f64>,
        /// Offset in seconds where the page ends.
        end_time: Option<f64>,
    },
}

/// Discriminant of [`PageBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Text page.
    Text,
    /// Image page.
    Image,
    /// Audio page.
    Audio,
}

/// One page of a work under a given viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    /// First position covered by the page.
    pub position: NormalizedPosition,
    /// First position after the page.
    pub end_position: NormalizedPosition,
    /// Page number under the viewport the page was produced for. The
    /// controller stamps it on every page it shows.
    #[serde(default)]
    pub page_number: Option<u32>,
    /// Chapter information, when known.
    #[serde(default)]
    pub chapter: Option<ChapterInfo>,
    /// Payload.
    #[serde(flatten)]
    pub body: PageBody,
}

impl PageContent {
    /// The page's slice of the position space.
    pub fn span(&self) -> PageSpan {
        PageSpan {
            start: self.position,
            end: self.end_position,
        }
    }

    /// Content type.
    pub fn kind(&self) -> ContentKind {
        match self.body {
            PageBody::Text { .. } => ContentKind::Text,
            PageBody::Image { .. } => ContentKind::Image,
            PageBody::Audio { .. } => ContentKind::Audio,
        }
    }

    /// Image URL for image pages.
    pub fn image_url(&self) -> Option<&str> {
        match &self.body {
            PageBody::Image { image_url } => Some(image_url),
            _ => None,
        }
    }
}
