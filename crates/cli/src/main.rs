use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use ebook_export_core::config::{
    config_path, export_options_from_config, history_store_from_config, load_config, set_config_key, AppConfig,
};
use ebook_export_core::css::stylesheet;
use ebook_export_core::export::{export, ExportOutcome, ExportTarget};
use ebook_export_core::history::HistoryStore;
use ebook_export_core::model::{BookExportModel, TypographyPreset};
use ebook_export_core::progress::{ExportStage, ProgressEvent, ProgressHandler};
use ebook_export_core::sanitize::sanitize_chapter;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "ebook-export")]
#[command(about = "Export authored books to EPUB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a book model (JSON) to EPUB
    Export {
        /// Book model JSON file
        input: String,

        /// Output file (defaults to the input name with .epub)
        #[arg(short, long)]
        output: Option<String>,

        /// Typography preset (novel, nonfiction, technical, poetry, default)
        #[arg(long)]
        typography: Option<String>,

        /// Cover image file (png, jpg, gif, webp); replaces the model's cover
        #[arg(long)]
        cover: Option<String>,

        /// Also record the archive in the export history
        #[arg(long)]
        history: bool,
    },

    /// Print the stylesheet for a typography preset
    Css {
        preset: String,
    },

    /// Convert an HTML file to an XHTML fragment as export would
    Sanitize {
        input: String,
    },

    /// Inspect or clear the export history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored exports for a book, newest first
    List { book_id: String },
    /// Write one stored export to a file
    Get {
        book_id: String,
        entry: String,
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Remove every stored export for a book
    Clear { book_id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
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

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Export { input, output, typography, cover, history } => {
            run_export(input, output.as_deref(), typography.as_deref(), cover.as_deref(), *history, cli.json).await
        }
        Commands::Css { preset } => run_css(preset),
        Commands::Sanitize { input } => run_sanitize(input),
        Commands::History { action } => run_history(action, cli.json),
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Drives an indicatif bar from export progress events.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{spinner} {prefix:>10} [{bar:30}] {pos}/{len} {wide_msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressHandler for BarProgress {
    fn on_progress(&self, event: ProgressEvent) {
        self.bar.set_prefix(event.stage.to_string());
        if let Some(total) = event.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(event.current);
        self.bar.set_message(event.message.unwrap_or_default());
        if event.stage == ExportStage::Packaging {
            self.bar.finish_and_clear();
        }
    }
}

async fn run_export(
    input: &str,
    output: Option<&str>,
    typography: Option<&str>,
    cover: Option<&str>,
    record_history: bool,
    json: bool,
) -> CliResult {
    let input_path = Path::new(input);
    let text = std::fs::read_to_string(input_path)
        .map_err(|e| format!("Could not read {}: {}", input_path.display(), e))?;
    let mut model = BookExportModel::from_json(&text)?;

    let cfg = load_config();
    let mut opts = export_options_from_config(&cfg);
    if let Some(name) = typography {
        let preset = TypographyPreset::ALL
            .into_iter()
            .find(|p| p.name() == name.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown typography preset: {}", name))?;
        model.typography_preset = Some(preset);
    }
    opts.cover_path = cover.map(PathBuf::from);

    let out_path = match output {
        Some(o) => PathBuf::from(o),
        None => input_path.with_extension("epub"),
    };

    let bar = (!json).then(BarProgress::new);
    let progress = bar.as_ref().map(|b| b as &dyn ProgressHandler);
    let outcome = export(&model, &opts, ExportTarget::File(out_path.clone()), progress).await?;
    let report = outcome.report().clone();
    let written = match outcome {
        ExportOutcome::Written { path, .. } => path,
        ExportOutcome::Bytes(_) => out_path,
    };

    let mut history_entry = None;
    if record_history {
        let book_id = model.id.clone().unwrap_or_else(|| slug(&model.title));
        match record_export(&cfg, &book_id, &model.title, &written) {
            Ok(entry) => history_entry = Some(entry),
            Err(e) => {
                tracing::warn!("History write failed: {}", e);
                eprintln!("Warning: export saved to {} but not recorded in history: {}", written.display(), e);
            }
        }
    }

    if json {
        let out = serde_json::json!({
            "output": written.display().to_string(),
            "report": report,
            "history": history_entry,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "Exported: {} ({} chapters, {} images, {} bytes)",
            written.display(),
            report.chapter_count,
            report.image_count,
            report.archive_size_bytes
        );
        if !report.degraded_chapters.is_empty() {
            let list: Vec<String> = report.degraded_chapters.iter().map(u32::to_string).collect();
            eprintln!("Warning: reduced fidelity in chapter(s) {}", list.join(", "));
        }
        if let Some(entry) = &history_entry {
            println!("History entry: {}", entry.id);
        }
    }

    Ok(())
}

fn record_export(
    cfg: &AppConfig,
    book_id: &str,
    title: &str,
    path: &Path,
) -> Result<ebook_export_core::history::HistoryEntry, Box<dyn std::error::Error + Send + Sync>> {
    let store = open_history(cfg)?;
    let data = std::fs::read(path)?;
    Ok(store.record(book_id, title, &data)?)
}

fn open_history(cfg: &AppConfig) -> Result<HistoryStore, Box<dyn std::error::Error + Send + Sync>> {
    Ok(history_store_from_config(&cfg.history).ok_or("Could not determine history directory")?)
}

/// History key for models without an id.
fn slug(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn run_css(preset: &str) -> CliResult {
    let preset = TypographyPreset::ALL
        .into_iter()
        .find(|p| p.name() == preset.trim().to_lowercase())
        .ok_or_else(|| format!("Unknown typography preset: {}", preset))?;
    print!("{}", stylesheet(preset));
    Ok(())
}

fn run_sanitize(input: &str) -> CliResult {
    let html = std::fs::read_to_string(input)?;
    let cfg = load_config();
    let opts = export_options_from_config(&cfg);
    let result = sanitize_chapter(&html, &opts.limits);
    if result.degraded {
        eprintln!("Warning: full conversion failed, fallback pass used");
    }
    println!("{}", result.xhtml);
    Ok(())
}

fn run_history(action: &HistoryAction, json: bool) -> CliResult {
    let cfg = load_config();
    let store = open_history(&cfg)?;
    match action {
        HistoryAction::List { book_id } => {
            let entries = store.list(book_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No exports recorded for {}", book_id);
            } else {
                for e in &entries {
                    println!(
                        "{}  {}  {:>9} bytes  {}",
                        e.id,
                        e.created_at.format("%Y-%m-%d %H:%M:%S"),
                        e.size_bytes,
                        e.title
                    );
                }
            }
        }
        HistoryAction::Get { book_id, entry, output } => {
            let (meta, data) = store.get(book_id, entry)?;
            let path = output
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}.epub", meta.id)));
            std::fs::write(&path, &data)?;
            if json {
                println!("{}", serde_json::json!({ "output": path.display().to_string(), "entry": meta }));
            } else {
                println!("Wrote {} ({} bytes)", path.display(), data.len());
            }
        }
        HistoryAction::Clear { book_id } => {
            let removed = store.clear(book_id)?;
            if json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("Removed {} export(s) for {}", removed, book_id);
            }
        }
    }
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            write_config(&path, &AppConfig::default())?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg = if path.exists() {
                let s = std::fs::read_to_string(&path)?;
                toml::from_str(&s).unwrap_or_else(|_| AppConfig::default())
            } else {
                AppConfig::default()
            };

            set_config_key(&mut cfg, key, value)?;
            write_config(&path, &cfg)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn write_config(path: &Path, cfg: &AppConfig) -> CliResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}
