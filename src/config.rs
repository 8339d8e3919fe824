use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Reader engine tools: settings, annotations and offline highlight rendering.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelf-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "SHELF_READER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a default config file and initialize the database.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Reader settings commands.
    Settings {
        /// Settings subcommand action.
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// List the highlights of a book.
    Highlights {
        /// Book ID.
        book: String,
    },

    /// List the bookmarks of a book.
    Bookmarks {
        /// Book ID.
        book: String,
    },

    /// Show the saved reading position of a book.
    Progress {
        /// Book ID.
        book: String,
    },

    /// Apply a book's stored highlights to a page fragment and print it.
    Render {
        /// Book ID.
        book: String,
        /// Page markup file.
        #[arg(long)]
        html: PathBuf,
        /// Normalized position where the page starts.
        #[arg(long)]
        start: f64,
        /// Normalized position where the page ends.
        #[arg(long)]
        end: f64,
    },
}

/// Settings subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print the merged settings.
    Show {
        /// Include a book's overrides.
        #[arg(long)]
        book: Option<String>,
    },

    /// Store a setting (globally, or for one book).
    Set {
        /// Setting name, e.g. fontSize or font_size.
        key: String,
        /// Value; parsed as JSON, falling back to a plain string.
        value: String,
        /// Store as an override for this book.
        #[arg(long)]
        book: Option<String>,
    },

    /// Remove stored settings.
    Reset {
        /// Only drop this book's overrides.
        #[arg(long)]
        book: Option<String>,
        /// Also drop global settings.
        #[arg(long)]
        all: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reader timing and layout configuration.
    #[serde(default)]
    pub reader: ReaderConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/reader.db")
}

/// Reader engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Pages fetched ahead of the current one.
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u32,

    /// Delay before prefetching starts, so it never competes with the
    /// page just requested.
    #[serde(default = "default_prefetch_delay_ms")]
    pub prefetch_delay_ms: u64,

    /// Quiet period before the reading position is saved.
    #[serde(default = "default_progress_debounce_ms")]
    pub progress_debounce_ms: u64,

    /// Minimum viewport width for automatic two-page spreads.
    #[serde(default = "default_spread_min_width")]
    pub spread_min_width: u32,

    /// Settle delay after a mouse selection.
    #[serde(default = "default_pointer_settle_ms")]
    pub pointer_settle_ms: u64,

    /// Settle delay after a touch selection.
    #[serde(default = "default_touch_settle_ms")]
    pub touch_settle_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            prefetch_count: default_prefetch_count(),
            prefetch_delay_ms: default_prefetch_delay_ms(),
            progress_debounce_ms: default_progress_debounce_ms(),
            spread_min_width: default_spread_min_width(),
            pointer_settle_ms: default_pointer_settle_ms(),
            touch_settle_ms: default_touch_settle_ms(),
        }
    }
}

impl ReaderConfig {
    /// Prefetch delay as a duration.
    pub fn prefetch_delay(&self) -> Duration {
        Duration::from_millis(self.prefetch_delay_ms)
    }

    /// Progress debounce as a duration.
    pub fn progress_debounce(&self) -> Duration {
        Duration::from_millis(self.progress_debounce_ms)
    }
}

fn default_prefetch_count() -> u32 {
    5
}

fn default_prefetch_delay_ms() -> u64 {
    100
}

fn default_progress_debounce_ms() -> u64 {
    2000
}

fn default_spread_min_width() -> u32 {
    1024
}

fn default_pointer_settle_ms() -> u64 {
    50
}

fn default_touch_settle_ms() -> u64 {
    100
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "shelf_reader=info".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::ReaderError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| {
            crate::error::ReaderError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("shelf-reader.toml"),
            dirs::config_dir()
                .map(|p| p.join("shelf-reader").join("config.toml"))
                .unwrap_or_default(),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# shelf-reader configuration

[database]
# path = "/var/lib/shelf-reader/reader.db"

[reader]
# Pages fetched ahead of the current one
prefetch_count = 5
# Delay before prefetching starts (ms)
prefetch_delay_ms = 100
# Quiet period before the reading position is saved (ms)
progress_debounce_ms = 2000
# Minimum viewport width for automatic two-page spreads (px)
spread_min_width = 1024
# Selection settle delays (ms)
pointer_settle_ms = 50
touch_settle_ms = 100

[logging]
filter = "shelf_reader=info"
"#
        .to_string()
    }
}
