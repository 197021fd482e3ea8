use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use bindery_core::{
    ArticleFilter, ArticlePatch, Config, EpubComposer, ExportOptions, IngestOutcome, Ingestor,
    Page, SortKey, Store,
};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;

/// Capture articles and assemble them into EPUB digests
#[derive(Parser, Debug)]
#[command(name = "bindery", version, about, long_about = None)]
struct Args {
    /// Data directory (default: platform data dir, or BINDERY env vars)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture an article from an HTML file or stdin
    Ingest {
        /// Local HTML file, or "-" for stdin
        #[arg(value_name = "INPUT")]
        input: String,

        /// Canonical URL of the captured page
        #[arg(long, value_name = "URL")]
        url: String,

        /// Skip image acquisition
        #[arg(long)]
        no_images: bool,
    },
    /// List stored articles
    List {
        /// Substring search across title, text, and excerpt
        #[arg(short, long, value_name = "QUERY")]
        search: Option<String>,

        /// Only archived articles
        #[arg(long)]
        archived: bool,

        /// Only favorite articles
        #[arg(long)]
        favorite: bool,

        /// Sort order (created_at_desc, created_at_asc, title_asc, title_desc, reading_time_asc)
        #[arg(long, default_value = "created_at_desc", value_name = "SORT")]
        sort: String,

        /// Page number, starting at 1
        #[arg(long, default_value = "1", value_name = "NUM")]
        page: u32,

        /// Page size, up to 100
        #[arg(long, default_value = "20", value_name = "NUM")]
        limit: u32,
    },
    /// Show one article as JSON
    Show {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Update an article's title or flags
    Update {
        #[arg(value_name = "ID")]
        id: i64,

        #[arg(long, value_name = "TITLE")]
        title: Option<String>,

        #[arg(long, value_name = "BOOL")]
        archived: Option<bool>,

        #[arg(long, value_name = "BOOL")]
        favorite: Option<bool>,
    },
    /// Delete an article and its stored images
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Assemble an EPUB from stored articles
    Export {
        /// Article ids to include, in any order
        #[arg(value_name = "ID", required = true)]
        ids: Vec<i64>,

        /// Digest title (default: dated digest title)
        #[arg(long, value_name = "TITLE")]
        title: Option<String>,

        /// Author line for the package and cover
        #[arg(long, value_name = "AUTHOR")]
        author: Option<String>,

        /// Background image for the cover
        #[arg(long, value_name = "FILE")]
        cover_background: Option<PathBuf>,
    },
    /// List past exports
    Exports {
        #[arg(long, default_value = "20", value_name = "NUM")]
        limit: u32,
    },
    /// Read or write delivery settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print a single setting value
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Set a setting value
    Set {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// List all settings (secrets masked)
    List,
}

fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer).context("Failed to read from stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read file: {input}"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter =
        if args.verbose { "bindery_core=debug,bindery=debug" } else { "bindery_core=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.data_dir {
        Some(dir) => Config::with_data_root(dir.clone()),
        None => Config::from_env(),
    };
    let store = Store::open(&config.db_path).await.context("Failed to open article store")?;

    match args.command {
        Command::Ingest { input, url, no_images } => {
            let html = read_input(&input)?;
            let ingestor = Ingestor::new(&store, &config);
            match ingestor.ingest(&html, &url, !no_images).await? {
                IngestOutcome::Stored { id, image_count } => {
                    print_success(&format!("Stored article {id} ({image_count} images)"));
                }
                IngestOutcome::Failed { id, error } => {
                    print_error(&format!("Capture failed ({error}), recorded as article {id}"));
                }
            }
        }
        Command::List { search, archived, favorite, sort, page, limit } => {
            let filter = ArticleFilter {
                search,
                is_archived: archived.then_some(true),
                is_favorite: favorite.then_some(true),
                sort: SortKey::parse(&sort),
            };
            let page = Page::new(page, limit)?;
            let (articles, total) = store.list_articles(filter, page).await?;
            for article in &articles {
                let marker = if article.capture_success { " " } else { "!" };
                println!(
                    "{marker} {:>5}  {}  {}",
                    article.id,
                    article.created_at.format("%Y-%m-%d"),
                    article.title
                );
            }
            eprintln!("{}", format!("{} of {} articles", articles.len(), total).dimmed());
        }
        Command::Show { id } => {
            let article = store.get_article(id).await?;
            let images = store.get_images(id).await?;
            let value = serde_json::json!({ "article": article, "images": images });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Update { id, title, archived, favorite } => {
            let patch = ArticlePatch { title, is_archived: archived, is_favorite: favorite };
            store.update_article(id, patch).await?;
            print_success(&format!("Updated article {id}"));
        }
        Command::Delete { id } => {
            store.delete_article(id, &config.images_dir).await?;
            print_success(&format!("Deleted article {id}"));
        }
        Command::Export { ids, title, author, cover_background } => {
            let composer = EpubComposer::new(&config.export_dir, &config.images_dir);
            let options = ExportOptions { title, author, cover_background };
            let export = composer.compose(&store, ids, options).await?;
            print_success(&format!(
                "Export {} written: {} ({} articles)",
                export.id, export.file_path, export.article_count
            ));
        }
        Command::Exports { limit } => {
            let exports = store.list_exports(limit).await?;
            for export in &exports {
                let sent = if export.sent_to_kindle { "sent" } else { "    " };
                println!(
                    "{:>5}  {}  {sent}  {}",
                    export.id,
                    export.created_at.format("%Y-%m-%d"),
                    export.name
                );
            }
        }
        Command::Settings { command } => match command {
            SettingsCommand::Get { key } => match store.get_setting(key.clone()).await? {
                Some(value) => println!("{value}"),
                None => print_error(&format!("{key} is not set")),
            },
            SettingsCommand::Set { key, value } => {
                store.set_setting(key.clone(), value).await?;
                print_success(&format!("{key} updated"));
            }
            SettingsCommand::List => {
                let settings = store.list_settings().await?;
                for setting in &settings {
                    println!("{:<16} {}", setting.key, setting.value);
                }
            }
        },
    }

    Ok(())
}
