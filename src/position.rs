//! Pagination-independent coordinates.
//!
//! A [`NormalizedPosition`] is a fraction of the whole work in `[0, 1)`.
//! Pages own a [`PageSpan`] of that space; the functions here translate
//! between a span and character offsets in the page's rendered text by
//! linear interpolation. The interpolation assumes uniform text density
//! across a page, which is acceptable because highlights are re-derived
//! against live text on every render.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Fractional progress through an entire work.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPosition(f64);

impl NormalizedPosition {
    /// Start of the work.
    pub const START: Self = Self(0.0);

    /// Create a position, clamping into `[0, 1]`. NaN maps to the start.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::START;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Raw fraction.
    pub fn value(self) -> f64 {
        self.0
    }

    /// Total ordering (positions are never NaN).
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for NormalizedPosition {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for NormalizedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A page's half-open `[start, end)` slice of the position space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSpan {
    /// First position on the page.
    pub start: NormalizedPosition,
    /// First position after the page.
    pub end: NormalizedPosition,
}

impl PageSpan {
    /// Build a span from raw fractions.
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: NormalizedPosition::new(start),
            end: NormalizedPosition::new(end),
        }
    }

    /// Width of the span. Never negative.
    pub fn len(&self) -> f64 {
        (self.end.value() - self.start.value()).max(0.0)
    }

    /// Zero-length spans cannot be interpolated.
    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }

    /// Half-open containment test.
    pub fn contains(&self, position: NormalizedPosition) -> bool {
        position >= self.start && position < self.end
    }
}

/// A `[start, end)` range of positions, as stored for a highlight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRange {
    /// Inclusive start.
    pub start: NormalizedPosition,
    /// Exclusive end.
    pub end: NormalizedPosition,
}

/// Half-open overlap test between a range and a page.
pub fn overlaps(range: PositionRange, span: PageSpan) -> bool {
    range.start < span.end && range.end > span.start
}

/// Clamp a range to the bounds of a page.
pub fn clamp_to_span(range: PositionRange, span: PageSpan) -> PositionRange {
    let start = if range.start < span.start {
        span.start
    } else {
        range.start
    };
    let end = if range.end > span.end {
        span.end
    } else {
        range.end
    };
    PositionRange { start, end }
}

/// Map a character offset within a page to a normalized position.
pub fn char_to_position(offset: usize, total_chars: usize, span: PageSpan) -> Option<NormalizedPosition> {
    if total_chars == 0 {
        return None;
    }
    let ratio = offset.min(total_chars) as f64 / total_chars as f64;
    Some(NormalizedPosition::new(
        span.start.value() + ratio * span.len(),
    ))
}

fn position_ratio(position: NormalizedPosition, span: PageSpan) -> Option<f64> {
    if span.is_empty() {
        return None;
    }
    Some(((position.value() - span.start.value()) / span.len()).clamp(0.0, 1.0))
}

/// Inverse interpolation for a range start. Rounds down so a highlight never
/// loses its first character.
pub fn position_to_char_start(
    position: NormalizedPosition,
    total_chars: usize,
    span: PageSpan,
) -> Option<usize> {
    let ratio = position_ratio(position, span)?;
    let offset = (ratio * total_chars as f64 + ROUNDING_SLACK).floor() as usize;
    Some(offset.min(total_chars))
}

/// Inverse interpolation for a range end. Rounds up so a highlight never
/// loses its last character.
pub fn position_to_char_end(
    position: NormalizedPosition,
    total_chars: usize,
    span: PageSpan,
) -> Option<usize> {
    let ratio = position_ratio(position, span)?;
    let offset = (ratio * total_chars as f64 - ROUNDING_SLACK).ceil().max(0.0) as usize;
    Some(offset.min(total_chars))
}

// Absorbs float noise such as 0.1 / 0.05 * 500 = 99.99999999999999 so that a
// position derived from an exact character offset maps back to that offset.
const ROUNDING_SLACK: f64 = 1e-9;

/// Convert a range already clamped to `span` into a character range.
/// Returns `None` when the range collapses to nothing.
pub fn range_to_chars(
    range: PositionRange,
    total_chars: usize,
    span: PageSpan,
) -> Option<(usize, usize)> {
    let start = position_to_char_start(range.start, total_chars, span)?;
    let end = position_to_char_end(range.end, total_chars, span)?;
    (end > start).then_some((start, end))
}
