//! shelf-reader command line entry point.

use clap::Parser;
use serde_json::Value;
use shelf_reader::{
    config::{Cli, Command, Config, SettingsCommand},
    db::{Database, timestamp_to_datetime},
    document::Document,
    mapper,
    position::PageSpan,
    settings::{SettingKey, SettingScope, SettingsStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::find_config_file);
    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(
        config = ?config_path.as_ref().map(|p| p.display().to_string()),
        database = %config.database.path.display(),
        "Configuration loaded"
    );

    match cli.command {
        Command::Init { force } => cmd_init(force).await,
        Command::Settings { action } => cmd_settings(action, &config).await,
        Command::Highlights { book } => cmd_highlights(&book, &config).await,
        Command::Bookmarks { book } => cmd_bookmarks(&book, &config).await,
        Command::Progress { book } => cmd_progress(&book, &config).await,
        Command::Render {
            book,
            html,
            start,
            end,
        } => cmd_render(&book, html, start, end, &config).await,
    }
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("shelf-reader.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit shelf-reader.toml to tune prefetch and progress timing.");
    println!("Then run: shelf-reader settings show");

    Ok(())
}

/// Reader settings commands.
async fn cmd_settings(action: SettingsCommand, config: &Config) -> anyhow::Result<()> {
    let db = Arc::new(Database::open(&config.database.path)?);

    match action {
        SettingsCommand::Show { book } => {
            let store = SettingsStore::new(db, book.as_deref());
            println!("{}", serde_json::to_string_pretty(&store.get())?);
        }

        SettingsCommand::Set { key, value, book } => {
            let key: SettingKey = key.parse()?;
            // Bare words such as `sepia` are not valid JSON
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            let scope = if book.is_some() {
                SettingScope::Book
            } else {
                SettingScope::Global
            };

            let store = SettingsStore::new(db, book.as_deref());
            store.update(scope, key, value)?;
            tracing::info!(
                %key,
                book = ?book,
                repaginates = key.affects_layout(),
                "Setting stored"
            );
            println!("{}", serde_json::to_string_pretty(&store.get())?);
        }

        SettingsCommand::Reset { book, all } => {
            let store = SettingsStore::new(db, book.as_deref());
            if all {
                store.reset_all()?;
                println!("Reset global settings");
            } else if book.is_some() {
                store.reset_book()?;
            } else {
                anyhow::bail!("Nothing to reset. Pass --book <id> or --all.");
            }
            if let Some(book) = book {
                println!("Reset settings for book: {}", book);
            }
        }
    }

    Ok(())
}

/// List highlights of a book.
async fn cmd_highlights(book: &str, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let highlights = db.get_highlights(book)?;

    if highlights.is_empty() {
        println!("No highlights found.");
        return Ok(());
    }

    println!("{:<36} {:<8} {:<10} {:<10} TEXT", "ID", "COLOR", "START", "END");
    println!("{}", "-".repeat(90));
    for h in highlights {
        println!(
            "{:<36} {:<8} {:<10} {:<10} {}",
            h.id,
            h.color,
            format!("{:.4}", h.start_position.value()),
            format!("{:.4}", h.end_position.value()),
            preview(&h.text, 40)
        );
        if let Some(note) = h.note {
            println!("{:>38}{}", "note: ", note);
        }
    }

    Ok(())
}

/// List bookmarks of a book.
async fn cmd_bookmarks(book: &str, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let bookmarks = db.get_bookmarks(book)?;

    if bookmarks.is_empty() {
        println!("No bookmarks found.");
        return Ok(());
    }

    println!("{:<36} {:<10} {:<6} {:<17} TITLE", "ID", "POSITION", "PAGE", "CREATED");
    println!("{}", "-".repeat(90));
    for b in bookmarks {
        println!(
            "{:<36} {:<10} {:<6} {:<17} {}",
            b.id,
            format!("{:.4}", b.position.value()),
            b.page_number
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            timestamp_to_datetime(b.created_at).format("%Y-%m-%d %H:%M"),
            b.title.unwrap_or_default()
        );
    }

    Ok(())
}

/// Show saved reading progress.
async fn cmd_progress(book: &str, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match db.get_progress(book)? {
        Some(progress) => println!(
            "{}: {:.1}% (page {}, updated {})",
            book,
            progress.position.value() * 100.0,
            progress.page_number,
            timestamp_to_datetime(progress.updated_at).format("%Y-%m-%d %H:%M")
        ),
        None => println!("No progress saved for: {}", book),
    }

    Ok(())
}

/// Draw stored highlights onto a page fragment.
async fn cmd_render(
    book: &str,
    html: PathBuf,
    start: f64,
    end: f64,
    config: &Config,
) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start > end {
        anyhow::bail!("Page span must satisfy 0 <= start <= end <= 1");
    }

    let markup = std::fs::read_to_string(&html)?;
    let db = Database::open(&config.database.path)?;
    let highlights = db.get_highlights(book)?;

    let mut doc = Document::parse(&markup)?;
    doc.sanitize();
    let root = doc.root();
    mapper::apply_highlights(&mut doc, root, &highlights, PageSpan::new(start, end));

    tracing::info!(
        book,
        file = %html.display(),
        highlights = highlights.len(),
        marks = mapper::marks(&doc, root).len(),
        "Rendered page"
    );
    println!("{}", doc.to_html());

    Ok(())
}

fn preview(text: &str, max: usize) -> String {
    let line = text.replace('\n', " ");
    if line.chars().count() <= max {
        line
    } else {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
