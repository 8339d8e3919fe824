//! Reader display area tracking.

use crate::settings::ReaderSettings;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Size of the reader's content box in whole pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Round a raw measurement to whole pixels. Negative and NaN become 0.
    pub fn from_measurement(width: f64, height: f64) -> Self {
        Self {
            width: round_px(width),
            height: round_px(height),
        }
    }

    /// A zero-sized container is not laid out yet.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

fn round_px(value: f64) -> u32 {
    if value.is_finite() {
        value.max(0.0).round() as u32
    } else {
        0
    }
}

/// Every input that makes pagination viewport-sensitive. Any change may
/// renumber pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Font size in pixels.
    pub font_size: u32,
    /// Line height multiplier.
    pub line_height: f64,
}

impl ViewportConfig {
    /// Combine a measured viewport with the layout settings.
    pub fn from_parts(viewport: Viewport, settings: &ReaderSettings) -> Self {
        Self {
            width: viewport.width,
            height: viewport.height,
            font_size: settings.font_size,
            line_height: settings.line_height,
        }
    }

    /// See [`Viewport::is_ready`].
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Publishes viewport changes of one reader container.
///
/// The host feeds every size observation into [`observe`](Self::observe);
/// observers are only woken when the rounded size actually changes.
#[derive(Debug)]
pub struct ViewportTracker {
    sender: watch::Sender<Option<Viewport>>,
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportTracker {
    /// Create a tracker with no measurement yet.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Record a measurement. Returns whether a new size was published.
    pub fn observe(&self, width: f64, height: f64) -> bool {
        let next = Viewport::from_measurement(width, height);
        let published = self.sender.send_if_modified(|current| {
            if *current == Some(next) {
                return false;
            }
            *current = Some(next);
            true
        });
        if published {
            tracing::debug!(width = next.width, height = next.height, "Viewport changed");
        }
        published
    }

    /// Latest published size.
    pub fn current(&self) -> Option<Viewport> {
        *self.sender.borrow()
    }

    /// Receive future size changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Viewport>> {
        self.sender.subscribe()
    }
}
