use crate::backend::AnnotationStore;
use crate::config::Config;
use crate::db::{Bookmark, Database, Highlight, HighlightColor, ReadingProgress, now_timestamp};
use crate::document::Document;
use crate::mapper;
use crate::position::{NormalizedPosition, PageSpan};
use crate::settings::{SettingKey, SettingScope, SettingsStore};
use std::sync::Arc;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn highlight(id: &str, book_id: &str, start: f64, end: f64) -> Highlight {
    Highlight {
        id: id.to_string(),
        book_id: book_id.to_string(),
        start_position: NormalizedPosition::new(start),
        end_position: NormalizedPosition::new(end),
        text: "Important text".to_string(),
        note: None,
        color: HighlightColor::Yellow,
        created_at: now_timestamp(),
    }
}

fn bookmark(id: &str, book_id: &str, position: f64) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        book_id: book_id.to_string(),
        position: NormalizedPosition::new(position),
        page_number: Some(12),
        title: Some("Important part".to_string()),
        note: None,
        created_at: now_timestamp(),
    }
}

#[test]
fn db_save_and_get_highlights() {
    let db = test_db();
    db.save_highlight(&highlight("hl-2", "book-1", 0.5, 0.6)).unwrap();
    db.save_highlight(&highlight("hl-1", "book-1", 0.1, 0.2)).unwrap();
    db.save_highlight(&highlight("hl-x", "book-2", 0.1, 0.2)).unwrap();

    let highlights = db.get_highlights("book-1").unwrap();
    assert_eq!(highlights.len(), 2);
    assert_eq!(highlights[0].id, "hl-1");
    assert_eq!(highlights[0].start_position.value(), 0.1);
    assert_eq!(highlights[1].text, "Important text");
}

#[test]
fn db_update_highlight_note_and_color() {
    let db = test_db();
    db.save_highlight(&highlight("hl-1", "book-1", 0.1, 0.2)).unwrap();

    assert!(db.set_highlight_note("hl-1", Some("My note")).unwrap());
    assert!(db.set_highlight_color("hl-1", HighlightColor::Purple).unwrap());
    assert!(!db.set_highlight_color("missing", HighlightColor::Blue).unwrap());

    let found = &db.get_highlights("book-1").unwrap()[0];
    assert_eq!(found.note.as_deref(), Some("My note"));
    assert_eq!(found.color, HighlightColor::Purple);
}

#[test]
fn db_delete_highlight() {
    let db = test_db();
    db.save_highlight(&highlight("hl-del", "book-1", 0.1, 0.2)).unwrap();

    assert!(db.delete_highlight("hl-del").unwrap());
    assert!(!db.delete_highlight("hl-del").unwrap());
    assert!(db.get_highlights("book-1").unwrap().is_empty());
}

#[test]
fn db_save_and_get_bookmarks() {
    let db = test_db();
    db.save_bookmark(&bookmark("bm-2", "book-1", 0.7)).unwrap();
    db.save_bookmark(&bookmark("bm-1", "book-1", 0.3)).unwrap();

    let bookmarks = db.get_bookmarks("book-1").unwrap();
    assert_eq!(bookmarks.len(), 2);
    assert_eq!(bookmarks[0].id, "bm-1");
    assert_eq!(bookmarks[0].title, Some("Important part".to_string()));
    assert_eq!(bookmarks[0].page_number, Some(12));

    assert!(db.delete_bookmark("bm-1").unwrap());
    assert_eq!(db.get_bookmarks("book-1").unwrap().len(), 1);
}

#[test]
fn db_update_progress() {
    let db = test_db();
    let ts = now_timestamp();

    db.save_progress(&ReadingProgress {
        book_id: "book-1".to_string(),
        position: NormalizedPosition::new(0.1),
        page_number: 10,
        updated_at: ts,
    })
    .unwrap();
    db.save_progress(&ReadingProgress {
        book_id: "book-1".to_string(),
        position: NormalizedPosition::new(0.8),
        page_number: 80,
        updated_at: ts + 1,
    })
    .unwrap();

    let found = db.get_progress("book-1").unwrap().unwrap();
    assert_eq!(found.page_number, 80);
    assert_eq!(found.position.value(), 0.8);
    assert!(db.get_progress("book-2").unwrap().is_none());
}

#[test]
fn db_settings_round_trip() {
    let db = test_db();
    assert!(db.get_setting("reader-settings").unwrap().is_none());

    db.set_setting("reader-settings", "{\"fontSize\":20}").unwrap();
    db.set_setting("reader-settings", "{\"fontSize\":22}").unwrap();
    assert_eq!(
        db.get_setting("reader-settings").unwrap().as_deref(),
        Some("{\"fontSize\":22}")
    );

    assert!(db.delete_setting("reader-settings").unwrap());
    assert!(!db.delete_setting("reader-settings").unwrap());
}

#[test]
fn db_backs_the_settings_store() {
    let db = Arc::new(test_db());
    let store = SettingsStore::new(db.clone(), Some("book-1"));

    store
        .update(SettingScope::Global, SettingKey::FontSize, 20.into())
        .unwrap();
    store
        .update(SettingScope::Book, SettingKey::Theme, "sepia".into())
        .unwrap();

    let settings = store.get();
    assert_eq!(settings.font_size, 20);
    assert_eq!(settings.theme, crate::settings::Theme::Sepia);
    assert!(db.get_setting("reader-settings:book-1").unwrap().is_some());

    let other = SettingsStore::new(db, Some("book-2")).get();
    assert_eq!(other.font_size, 20);
    assert_eq!(other.theme, crate::settings::Theme::default());
}

#[test]
fn annotation_store_reports_missing_highlights() {
    let db = test_db();
    tokio_test::block_on(async {
        db.add_highlight(&highlight("hl-1", "book-1", 0.1, 0.2))
            .await
            .unwrap();
        AnnotationStore::update_highlight_color(&db, "hl-1", HighlightColor::Green)
            .await
            .unwrap();
        assert!(
            AnnotationStore::update_highlight_note(&db, "nope", Some("x"))
                .await
                .is_err()
        );
        AnnotationStore::delete_highlight(&db, "nope").await.unwrap();

        let stored = AnnotationStore::get_highlights(&db, "book-1").await.unwrap();
        assert_eq!(stored[0].color, HighlightColor::Green);
    });
}

#[test]
fn annotation_store_saves_progress() {
    let db = test_db();
    tokio_test::block_on(async {
        db.save_reading_progress("book-1", NormalizedPosition::new(0.42), 7)
            .await
            .unwrap();
        let progress = db.get_reading_progress("book-1").await.unwrap().unwrap();
        assert_eq!(progress.page_number, 7);
        assert_eq!(progress.position.value(), 0.42);
    });
}

#[test]
fn db_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("reader.db");

    {
        let db = Database::open(&path).unwrap();
        db.save_highlight(&highlight("hl-1", "book-1", 0.1, 0.2)).unwrap();
        db.set_setting("reader-settings", "{}").unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.get_highlights("book-1").unwrap().len(), 1);
    assert!(db.get_setting("reader-settings").unwrap().is_some());
}

#[test]
fn stored_highlights_render_onto_a_page() {
    let db = test_db();
    db.save_highlight(&highlight("hl-1", "book-1", 0.1, 0.15)).unwrap();
    let highlights = db.get_highlights("book-1").unwrap();

    let mut doc = Document::parse("<p>0123456789</p><p>abcdefghij</p>").unwrap();
    let root = doc.root();
    mapper::apply_highlights(&mut doc, root, &highlights, PageSpan::new(0.1, 0.2));

    assert_eq!(mapper::extract_marked_text(&doc, root, "hl-1"), "0123456789");
}

#[test]
fn config_parse_toml() {
    let toml = r#"
[database]
path = "/var/lib/shelf-reader/reader.db"

[reader]
prefetch_count = 3
progress_debounce_ms = 500
spread_min_width = 900

[logging]
filter = "shelf_reader=debug"
"#;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.database.path.to_str(), Some("/var/lib/shelf-reader/reader.db"));
    assert_eq!(config.reader.prefetch_count, 3);
    assert_eq!(config.reader.progress_debounce_ms, 500);
    assert_eq!(config.reader.spread_min_width, 900);
    assert_eq!(config.reader.prefetch_delay_ms, 100);
    assert_eq!(config.logging.filter, "shelf_reader=debug");
}

#[test]
fn config_load_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelf-reader.toml");
    std::fs::write(&path, Config::generate_default()).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.reader.touch_settle_ms, 100);
    assert!(Config::load(&dir.path().join("missing.toml")).is_err());
}
