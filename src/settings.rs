//! Reader preferences.
//!
//! Settings are stored as two JSON objects: a global one shared by every
//! book and an optional per-book override. Both are stored exactly as
//! written. Validation happens on every read, field by field: a value that
//! is out of range is clamped and snapped to its step, a value of the wrong
//! shape falls back to the next layer (book, then global, then default).
//! Reading never fails.

use crate::error::{ReaderError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Storage key of the global settings object.
pub const GLOBAL_SETTINGS_KEY: &str = "reader-settings";

/// Storage key of a book's settings override.
pub fn book_settings_key(book_id: &str) -> String {
    format!("{}:{}", GLOBAL_SETTINGS_KEY, book_id)
}

/// Colour theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark text on white.
    #[default]
    Light,
    /// Light text on black.
    Dark,
    /// Warm paper tone.
    Sepia,
}

/// Body font family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontFamily {
    /// Serif face.
    #[default]
    Serif,
    /// Sans-serif face.
    SansSerif,
    /// Monospaced face.
    Monospace,
    /// Dyslexia-friendly face.
    Dyslexic,
}

/// Paragraph alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// Ragged right.
    #[default]
    Left,
    /// Justified.
    Justify,
}

/// How comic pages are fitted into the viewport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComicFitMode {
    /// Fit page width.
    Width,
    /// Fit page height.
    Height,
    /// Fit the whole page.
    #[default]
    Contain,
    /// Natural size.
    Original,
}

/// Page progression direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingDirection {
    /// Left to right.
    #[default]
    Ltr,
    /// Right to left (manga).
    Rtl,
}

/// Image page layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfPageLayout {
    /// Always one page.
    Single,
    /// Always two pages side by side.
    Spread,
    /// Two pages on wide viewports.
    #[default]
    Auto,
}

/// Merged, validated reader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSettings {
    /// Colour theme.
    pub theme: Theme,
    /// Font family.
    pub font_family: FontFamily,
    /// Font size in pixels.
    pub font_size: u32,
    /// Line height multiplier.
    pub line_height: f64,
    /// Maximum text column width in pixels.
    pub max_width: u32,
    /// Paragraph alignment.
    pub text_align: TextAlign,
    /// Page margins in pixels.
    pub margins: u32,
    /// Comic fit mode.
    pub comic_fit_mode: ComicFitMode,
    /// Reading direction.
    pub reading_direction: ReadingDirection,
    /// Image page layout.
    pub pdf_page_layout: PdfPageLayout,
    /// Audio playback rate.
    pub audio_playback_speed: f64,
    /// Audio volume in `[0, 1]`.
    pub audio_volume: f64,
}

impl ReaderSettings {
    /// Current value of one setting, in its stored form.
    pub fn value(&self, key: SettingKey) -> Value {
        let value = match key {
            SettingKey::Theme => serde_json::to_value(&self.theme),
            SettingKey::FontFamily => serde_json::to_value(&self.font_family),
            SettingKey::FontSize => serde_json::to_value(self.font_size),
            SettingKey::LineHeight => serde_json::to_value(self.line_height),
            SettingKey::MaxWidth => serde_json::to_value(self.max_width),
            SettingKey::TextAlign => serde_json::to_value(&self.text_align),
            SettingKey::Margins => serde_json::to_value(self.margins),
            SettingKey::ComicFitMode => serde_json::to_value(&self.comic_fit_mode),
            SettingKey::ReadingDirection => serde_json::to_value(&self.reading_direction),
            SettingKey::PdfPageLayout => serde_json::to_value(&self.pdf_page_layout),
            SettingKey::AudioPlaybackSpeed => serde_json::to_value(self.audio_playback_speed),
            SettingKey::AudioVolume => serde_json::to_value(self.audio_volume),
        };
        value.unwrap_or(Value::Null)
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            font_family: FontFamily::default(),
            font_size: 18,
            line_height: 1.6,
            max_width: 720,
            text_align: TextAlign::default(),
            margins: 24,
            comic_fit_mode: ComicFitMode::default(),
            reading_direction: ReadingDirection::default(),
            pdf_page_layout: PdfPageLayout::default(),
            audio_playback_speed: 1.0,
            audio_volume: 1.0,
        }
    }
}

/// Numeric bounds of a setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    /// Smallest allowed value.
    pub min: f64,
    /// Largest allowed value.
    pub max: f64,
    /// Granularity, counted from `min`.
    pub step: f64,
}

impl NumericRange {
    /// Clamp into range and snap to the nearest step.
    pub fn validate(&self, value: f64) -> f64 {
        let clamped = value.clamp(self.min, self.max);
        let steps = ((clamped - self.min) / self.step).round();
        let snapped = (self.min + steps * self.step).clamp(self.min, self.max);
        // Drop float noise such as 1.6000000000000003.
        (snapped * 1e6).round() / 1e6
    }
}

/// Declared constraint of a setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Numeric value with bounds.
    Range(NumericRange),
    /// One of a fixed set of names.
    OneOf(&'static [&'static str]),
}

/// Name of a single setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    /// [`ReaderSettings::theme`]
    Theme,
    /// [`ReaderSettings::font_family`]
    FontFamily,
    /// [`ReaderSettings::font_size`]
    FontSize,
    /// [`ReaderSettings::line_height`]
    LineHeight,
    /// [`ReaderSettings::max_width`]
    MaxWidth,
    /// [`ReaderSettings::text_align`]
    TextAlign,
    /// [`ReaderSettings::margins`]
    Margins,
    /// [`ReaderSettings::comic_fit_mode`]
    ComicFitMode,
    /// [`ReaderSettings::reading_direction`]
    ReadingDirection,
    /// [`ReaderSettings::pdf_page_layout`]
    PdfPageLayout,
    /// [`ReaderSettings::audio_playback_speed`]
    AudioPlaybackSpeed,
    /// [`ReaderSettings::audio_volume`]
    AudioVolume,
}

impl SettingKey {
    /// Every key.
    pub const ALL: [SettingKey; 12] = [
        SettingKey::Theme,
        SettingKey::FontFamily,
        SettingKey::FontSize,
        SettingKey::LineHeight,
        SettingKey::MaxWidth,
        SettingKey::TextAlign,
        SettingKey::Margins,
        SettingKey::ComicFitMode,
        SettingKey::ReadingDirection,
        SettingKey::PdfPageLayout,
        SettingKey::AudioPlaybackSpeed,
        SettingKey::AudioVolume,
    ];

    /// Name used in the stored JSON objects.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Theme => "theme",
            SettingKey::FontFamily => "fontFamily",
            SettingKey::FontSize => "fontSize",
            SettingKey::LineHeight => "lineHeight",
            SettingKey::MaxWidth => "maxWidth",
            SettingKey::TextAlign => "textAlign",
            SettingKey::Margins => "margins",
            SettingKey::ComicFitMode => "comicFitMode",
            SettingKey::ReadingDirection => "readingDirection",
            SettingKey::PdfPageLayout => "pdfPageLayout",
            SettingKey::AudioPlaybackSpeed => "audioPlaybackSpeed",
            SettingKey::AudioVolume => "audioVolume",
        }
    }

    /// Declared constraint.
    pub fn constraint(&self) -> Constraint {
        let range = |min, max, step| Constraint::Range(NumericRange { min, max, step });
        match self {
            SettingKey::Theme => Constraint::OneOf(&["light", "dark", "sepia"]),
            SettingKey::FontFamily => {
                Constraint::OneOf(&["serif", "sans-serif", "monospace", "dyslexic"])
            }
            SettingKey::FontSize => range(12.0, 32.0, 1.0),
            SettingKey::LineHeight => range(1.0, 2.5, 0.1),
            SettingKey::MaxWidth => range(400.0, 1200.0, 50.0),
            SettingKey::TextAlign => Constraint::OneOf(&["left", "justify"]),
            SettingKey::Margins => range(0.0, 96.0, 4.0),
            SettingKey::ComicFitMode => {
                Constraint::OneOf(&["width", "height", "contain", "original"])
            }
            SettingKey::ReadingDirection => Constraint::OneOf(&["ltr", "rtl"]),
            SettingKey::PdfPageLayout => Constraint::OneOf(&["single", "spread", "auto"]),
            SettingKey::AudioPlaybackSpeed => range(0.5, 3.0, 0.25),
            SettingKey::AudioVolume => range(0.0, 1.0, 0.05),
        }
    }

    /// Whether changing this setting reflows text.
    pub fn affects_layout(&self) -> bool {
        matches!(
            self,
            SettingKey::FontFamily
                | SettingKey::FontSize
                | SettingKey::LineHeight
                | SettingKey::MaxWidth
                | SettingKey::TextAlign
                | SettingKey::Margins
        )
    }
}

impl FromStr for SettingKey {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s) || snake(k.as_str()) == s)
            .ok_or_else(|| ReaderError::Config(format!("Unknown setting: {}", s)))
    }
}

fn snake(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for c in camel.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn read_number(value: &Value, range: NumericRange) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| range.validate(raw))
}

fn read_enum<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match value {
        Value::String(s) => serde_json::from_value(Value::String(s.trim().to_ascii_lowercase())).ok(),
        _ => None,
    }
}

impl ReaderSettings {
    /// Validate `value` for `key` and assign it. Returns `false` (leaving
    /// the field untouched) when the value has the wrong shape.
    pub fn apply(&mut self, key: SettingKey, value: &Value) -> bool {
        let number = || match key.constraint() {
            Constraint::Range(range) => read_number(value, range),
            Constraint::OneOf(_) => None,
        };
        fn set<T>(slot: &mut T, value: Option<T>) -> bool {
            match value {
                Some(v) => {
                    *slot = v;
                    true
                }
                None => false,
            }
        }
        match key {
            SettingKey::Theme => set(&mut self.theme, read_enum(value)),
            SettingKey::FontFamily => set(&mut self.font_family, read_enum(value)),
            SettingKey::FontSize => set(&mut self.font_size, number().map(|n| n as u32)),
            SettingKey::LineHeight => set(&mut self.line_height, number()),
            SettingKey::MaxWidth => set(&mut self.max_width, number().map(|n| n as u32)),
            SettingKey::TextAlign => set(&mut self.text_align, read_enum(value)),
            SettingKey::Margins => set(&mut self.margins, number().map(|n| n as u32)),
            SettingKey::ComicFitMode => set(&mut self.comic_fit_mode, read_enum(value)),
            SettingKey::ReadingDirection => set(&mut self.reading_direction, read_enum(value)),
            SettingKey::PdfPageLayout => set(&mut self.pdf_page_layout, read_enum(value)),
            SettingKey::AudioPlaybackSpeed => set(&mut self.audio_playback_speed, number()),
            SettingKey::AudioVolume => set(&mut self.audio_volume, number()),
        }
    }

    /// Merge stored layers, first layer wins per field.
    pub fn merge(layers: &[&Map<String, Value>]) -> Self {
        let mut settings = Self::default();
        for key in SettingKey::ALL {
            for layer in layers {
                if let Some(value) = layer.get(key.as_str())
                    && settings.apply(key, value)
                {
                    break;
                }
            }
        }
        settings
    }
}

/// Whether switching from `old` to `new` reflows text.
pub fn layout_changed(old: &ReaderSettings, new: &ReaderSettings) -> bool {
    SettingKey::ALL
        .into_iter()
        .filter(SettingKey::affects_layout)
        .any(|key| old.value(key) != new.value(key))
}

/// Key-value persistence for settings objects.
pub trait SettingsStorage: Send + Sync {
    /// Load a stored blob.
    fn load(&self, key: &str) -> Result<Option<String>>;
    /// Store a blob.
    fn save(&self, key: &str, value: &str) -> Result<()>;
    /// Delete a blob.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process settings storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: parking_lot::Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Which layer a write goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingScope {
    /// Shared by every book.
    Global,
    /// Override for the current book.
    Book,
}

/// Global + per-book settings for one open book.
#[derive(Clone)]
pub struct SettingsStore {
    storage: Arc<dyn SettingsStorage>,
    book_id: Option<String>,
}

impl SettingsStore {
    /// Create a store. Without a book id only the global layer exists.
    pub fn new(storage: Arc<dyn SettingsStorage>, book_id: Option<&str>) -> Self {
        Self {
            storage,
            book_id: book_id.map(str::to_string),
        }
    }

    /// Merged, validated settings.
    pub fn get(&self) -> ReaderSettings {
        let global = self.load_layer(GLOBAL_SETTINGS_KEY);
        match self.book_key() {
            Some(key) => {
                let book = self.load_layer(&key);
                ReaderSettings::merge(&[&book, &global])
            }
            None => ReaderSettings::merge(&[&global]),
        }
    }

    /// Write a global setting.
    pub fn update_global(&self, key: SettingKey, value: Value) -> Result<()> {
        self.write(GLOBAL_SETTINGS_KEY, key, value)
    }

    /// Write a per-book override.
    pub fn update_book(&self, key: SettingKey, value: Value) -> Result<()> {
        let storage_key = self
            .book_key()
            .ok_or_else(|| ReaderError::Config("No book is open".to_string()))?;
        self.write(&storage_key, key, value)
    }

    /// Write to either layer.
    pub fn update(&self, scope: SettingScope, key: SettingKey, value: Value) -> Result<()> {
        match scope {
            SettingScope::Global => self.update_global(key, value),
            SettingScope::Book => self.update_book(key, value),
        }
    }

    /// Drop the current book's overrides.
    pub fn reset_book(&self) -> Result<()> {
        if let Some(key) = self.book_key() {
            self.storage.remove(&key)?;
        }
        Ok(())
    }

    /// Drop global settings and the current book's overrides.
    pub fn reset_all(&self) -> Result<()> {
        self.storage.remove(GLOBAL_SETTINGS_KEY)?;
        self.reset_book()
    }

    fn book_key(&self) -> Option<String> {
        self.book_id.as_deref().map(book_settings_key)
    }

    fn write(&self, storage_key: &str, key: SettingKey, value: Value) -> Result<()> {
        let mut layer = self.load_layer(storage_key);
        layer.insert(key.as_str().to_string(), value);
        let blob = serde_json::to_string(&Value::Object(layer))?;
        self.storage.save(storage_key, &blob)
    }

    fn load_layer(&self, storage_key: &str) -> Map<String, Value> {
        let blob = match self.storage.load(storage_key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Map::new(),
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "Failed to load settings");
                return Map::new();
            }
        };
        match serde_json::from_str::<Value>(&blob) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!(key = storage_key, "Stored settings are not an object, ignoring");
                Map::new()
            }
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "Stored settings are corrupt, ignoring");
                Map::new()
            }
        }
    }
}
