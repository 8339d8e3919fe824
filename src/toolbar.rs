//! Placement of the floating highlight toolbar.

use serde::{Deserialize, Serialize};

/// Toolbar width in pixels.
pub const TOOLBAR_WIDTH: f64 = 220.0;
/// Toolbar height in pixels.
pub const TOOLBAR_HEIGHT: f64 = 44.0;
/// Minimum distance to the target and to the container edges.
pub const TOOLBAR_GAP: f64 = 8.0;

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub left: f64,
    /// Top edge.
    pub top: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Build a rectangle.
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Whether a point lies inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// Toolbar coordinates relative to the container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolbarPosition {
    /// Left edge of the toolbar.
    pub x: f64,
    /// Top edge of the toolbar.
    pub y: f64,
    /// Whether the toolbar sits above the target.
    pub above: bool,
}

/// Center the toolbar over `target`, keep it inside `container`, and flip it
/// below the target when there is no room above.
pub fn calculate_toolbar_position(target: Rect, container: Rect) -> ToolbarPosition {
    let centered = target.left - container.left + target.width / 2.0 - TOOLBAR_WIDTH / 2.0;
    let max_x = container.width - TOOLBAR_WIDTH - TOOLBAR_GAP;
    let x = if max_x < TOOLBAR_GAP {
        TOOLBAR_GAP
    } else {
        centered.clamp(TOOLBAR_GAP, max_x)
    };

    let y_above = target.top - container.top - TOOLBAR_HEIGHT - TOOLBAR_GAP;
    if y_above >= TOOLBAR_GAP {
        ToolbarPosition {
            x,
            y: y_above,
            above: true,
        }
    } else {
        ToolbarPosition {
            x,
            y: target.bottom() - container.top + TOOLBAR_GAP,
            above: false,
        }
    }
}
