use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use epub_shelf_core::config::{
    config_path, import_options_from_config, load_config, load_config_from, save_config, set_value,
    AppConfig,
};
use epub_shelf_core::cover::{DirCoverSink, MemoryCoverSink};
use epub_shelf_core::error::ShelfError;
use epub_shelf_core::import::Importer;
use epub_shelf_core::library::{BookStore, DirStore, ListOptions, SortKey, SortMethod};
use epub_shelf_core::parser::EpubParser;
use epub_shelf_core::progress::{ProgressEvent, ProgressHandler};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "epub-shelf")]
#[command(about = "Import EPUB books and browse their metadata and tables of contents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more EPUB files into the library
    Import {
        /// Input file(s)
        #[arg(required = true)]
        input: Vec<String>,
    },

    /// Parse an EPUB without importing it
    Inspect {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// List books in the library
    List {
        /// Sort key (title, author, date, last_read)
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Only books whose title (or, failing that, author) matches
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        offset: Option<u64>,

        #[arg(long)]
        limit: Option<u64>,
    },

    /// Search by title, falling back to author
    Search {
        #[arg(required = true)]
        query: String,
    },

    /// Show a book and its table of contents
    Show {
        /// Book id
        #[arg(required = true)]
        id: String,
    },

    /// Record the reading position of a book
    Position {
        /// Book id
        id: String,
        /// Renderer-specific location (e.g. an EPUB CFI)
        position: String,
    },

    /// Delete a book and its chapters
    Delete {
        /// Book id
        #[arg(required = true)]
        id: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Import { input } => run_import(&cli, input),
        Commands::Inspect { input } => run_inspect(&cli, input),
        Commands::List {
            sort,
            desc,
            query,
            offset,
            limit,
        } => run_list(&cli, sort.as_deref(), *desc, query.clone(), *offset, *limit),
        Commands::Search { query } => run_search(&cli, query),
        Commands::Show { id } => run_show(&cli, id),
        Commands::Position { id, position } => run_position(&cli, id, position),
        Commands::Delete { id } => run_delete(&cli, id),
        Commands::Config { action } => run_config(&cli, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_cli_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error + Send + Sync>> {
    match &cli.config {
        Some(path) if path.exists() => Ok(load_config_from(path)?),
        Some(_) => Ok(AppConfig::default()),
        None => Ok(load_config()),
    }
}

fn cli_config_path(cli: &Cli) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    cli.config
        .clone()
        .or_else(config_path)
        .ok_or_else(|| "Could not determine config directory".into())
}

fn open_store(cfg: &AppConfig) -> Result<DirStore, Box<dyn std::error::Error + Send + Sync>> {
    let dir = cfg.storage.library_dir();
    tracing::debug!("Using library at {}", dir.display());
    Ok(DirStore::open(dir)?)
}

/// The message shown when a book cannot be imported.
fn unreadable(e: &ShelfError) -> String {
    match e {
        ShelfError::Import(inner) => format!("could not read this book: {inner}"),
        other => format!("could not read this book: {other}"),
    }
}

/// Reports each import stage as a debug log line.
struct StageLog;

impl ProgressHandler for StageLog {
    fn on_progress(&self, event: ProgressEvent) {
        match event.message {
            Some(m) => tracing::debug!(
                "[{}/{}] {}: {}",
                event.current,
                event.total,
                event.stage.as_str(),
                m
            ),
            None => tracing::debug!("[{}/{}] {}", event.current, event.total, event.stage.as_str()),
        }
    }
}

fn run_import(cli: &Cli, inputs: &[String]) -> CliResult {
    let cfg = load_cli_config(cli)?;
    let mut importer = Importer::new(
        Arc::new(open_store(&cfg)?),
        Arc::new(DirCoverSink::new(cfg.storage.covers_dir())),
        import_options_from_config(&cfg),
    );
    if cli.verbose {
        importer = importer.with_progress(Arc::new(StageLog));
    }

    let mut imported = Vec::new();
    let mut failed = 0usize;
    for input in inputs {
        match importer.import_path(input) {
            Ok(book) => {
                if !cli.json {
                    println!(
                        "Imported: {} by {} ({} chapters) [{}]",
                        book.book.title,
                        book.book.author,
                        book.chapters.len(),
                        book.book.id
                    );
                }
                imported.push(book.book);
            }
            Err(e) => {
                eprintln!("{}: {}", input, unreadable(&e));
                failed += 1;
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&imported)?);
    }
    if failed > 0 {
        return Err(format!("{failed} of {} file(s) could not be imported", inputs.len()).into());
    }
    Ok(())
}

fn run_inspect(cli: &Cli, input: &str) -> CliResult {
    let cfg = load_cli_config(cli)?;
    let bytes = std::fs::read(Path::new(input))?;
    let sink = MemoryCoverSink::new();
    let parsed = EpubParser::parse(&bytes, &import_options_from_config(&cfg), &sink, None)
        .map_err(|e| unreadable(&ShelfError::from(e)))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
        return Ok(());
    }
    println!("Title:   {}", parsed.metadata.title);
    println!("Author:  {}", parsed.metadata.author);
    println!("Package: {}", parsed.package_path);
    match sink.stored().first() {
        Some((_, data)) => println!("Cover:   {} bytes", data.len()),
        None => println!("Cover:   none"),
    }
    print_toc(parsed.chapters.iter().map(|c| (c.order, c.title.as_str(), c.href.as_str())));
    Ok(())
}

fn print_toc<'a>(entries: impl Iterator<Item = (u32, &'a str, &'a str)>) {
    let mut any = false;
    for (order, title, href) in entries {
        if !any {
            println!("Contents:");
            any = true;
        }
        println!("  {:>3}. {}  ({})", order + 1, title, href);
    }
    if !any {
        println!("Contents: none");
    }
}

fn run_list(
    cli: &Cli,
    sort: Option<&str>,
    descending: bool,
    query: Option<String>,
    offset: Option<u64>,
    limit: Option<u64>,
) -> CliResult {
    let cfg = load_cli_config(cli)?;
    let store = open_store(&cfg)?;
    let sort = match sort {
        Some(s) => Some(SortMethod {
            key: s.parse::<SortKey>()?,
            descending,
        }),
        None if descending => Some(SortMethod {
            key: SortKey::Date,
            descending,
        }),
        None => None,
    };
    let result = store.list(&ListOptions {
        query,
        sort,
        offset,
        limit,
    })?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for b in &result.entries {
            println!("{}  {} - {}", b.id, b.author, b.title);
        }
        println!("{} of {} book(s)", result.entries.len(), result.total);
    }
    Ok(())
}

fn run_search(cli: &Cli, query: &str) -> CliResult {
    let cfg = load_cli_config(cli)?;
    let hits = open_store(&cfg)?.search(query)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("No matches for \"{}\"", query);
    } else {
        for b in &hits {
            println!("{}  {} - {}", b.id, b.author, b.title);
        }
    }
    Ok(())
}

fn run_show(cli: &Cli, id: &str) -> CliResult {
    let cfg = load_cli_config(cli)?;
    let store = open_store(&cfg)?;
    let book = store.get_book(id)?;
    let chapters = store.chapters(id)?;

    if cli.json {
        let out = serde_json::json!({ "book": book, "chapters": chapters });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!("Title:    {}", book.title);
    println!("Author:   {}", book.author);
    println!("File:     {}", book.file_path);
    if !book.cover_url.is_empty() {
        println!("Cover:    {}", book.cover_url);
    }
    if !book.last_read_position.is_empty() {
        println!("Position: {}", book.last_read_position);
    }
    print_toc(chapters.iter().map(|c| (c.order, c.title.as_str(), c.href.as_str())));
    Ok(())
}

fn run_position(cli: &Cli, id: &str, position: &str) -> CliResult {
    let cfg = load_cli_config(cli)?;
    open_store(&cfg)?.set_last_read_position(id, position)?;
    if !cli.json {
        println!("Updated position of {}", id);
    }
    Ok(())
}

fn run_delete(cli: &Cli, id: &str) -> CliResult {
    let cfg = load_cli_config(cli)?;
    open_store(&cfg)?.delete_book(id)?;
    if !cli.json {
        println!("Deleted {}", id);
    }
    Ok(())
}

fn run_config(cli: &Cli, action: &ConfigAction) -> CliResult {
    match action {
        ConfigAction::Init { force } => {
            let path = cli_config_path(cli)?;
            if path.exists() && !force {
                return Err(format!(
                    "Config already exists at {} (use --force to replace it)",
                    path.display()
                )
                .into());
            }
            save_config(&AppConfig::default(), &path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_cli_config(cli)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = cli_config_path(cli)?;
            // Strict: a broken file must not be replaced by defaults.
            let mut cfg = if path.exists() {
                load_config_from(&path)?
            } else {
                AppConfig::default()
            };
            set_value(&mut cfg, key, value)?;
            save_config(&cfg, &path)?;
            if !cli.json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}
