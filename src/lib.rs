//! shelf-reader: pagination and positional highlighting for a book reader.
//!
//! This crate drives the reading view of an ebook, comic or audiobook
//! reader. Books are paginated by a backend for the current viewport; the
//! engine keeps track of the displayed page, prefetches what comes next and
//! persists the reading position. Highlights and bookmarks are stored as
//! normalized positions, so they survive any repagination.
//!
//! # Features
//!
//! - Viewport-aware pagination with two-page spreads for image books
//! - Background prefetch and debounced progress saving
//! - Selection to position mapping and highlight re-application
//! - Layered (global and per-book) reader settings with validation
//! - Text, image and audio page views
//! - SQLite persistence for highlights, bookmarks, progress and settings

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Collaborator interfaces.
pub mod backend;
/// Configuration and CLI.
pub mod config;
/// Page content model.
pub mod content;
/// Pagination controller.
pub mod controller;
/// Database operations.
pub mod db;
/// Page markup tree.
pub mod document;
/// Error types.
pub mod error;
/// Selection and highlight mapping.
pub mod mapper;
/// Normalized positions.
pub mod position;
/// Page views.
pub mod renderer;
/// Reading sessions.
pub mod session;
/// Reader settings.
pub mod settings;
/// Highlight toolbar placement.
pub mod toolbar;
/// Viewport measurement.
pub mod viewport;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use controller::{PaginationController, ReaderState};
pub use db::Database;
pub use error::{ReaderError, Result};
pub use position::NormalizedPosition;
pub use session::ReaderSession;
