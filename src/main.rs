use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use coki_core::{AppMode, Config, KeySource, ResolvedKey, SearchHistory};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "coki")]
#[command(version, about = "AI web search, image generation and chat in the terminal")]
struct Cli {
    /// Mode to open in: search, image or chat
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<AppMode>,

    /// Gemini API key for this run (not saved)
    #[arg(long)]
    api_key: Option<String>,

    /// Log file (defaults to <cache dir>/coki/coki.log)
    #[arg(long, env = "COKI_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_mode(s: &str) -> Result<AppMode, String> {
    AppMode::from_str(s).ok_or_else(|| format!("unknown mode '{}' (expected search, image or chat)", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = match cli.log_file {
        Some(path) => path,
        None => default_log_path()?,
    };
    init_logging(cli.verbose, &log_path)?;

    let config_path = Config::default_path()?;
    let mut config = Config::load_from(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path.display(), "failed to load config, using defaults");
        Config::new()
    });
    if let Some(mode) = cli.mode {
        config.start_mode = mode;
    }

    let history = match SearchHistory::default_path() {
        Ok(path) => SearchHistory::load_from(&path).unwrap_or_else(|e| {
            warn!(error = %e, "failed to load search history");
            SearchHistory::new()
        }),
        Err(e) => {
            warn!(error = %e, "no history location");
            SearchHistory::new()
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), mode = config.start_mode.as_str(), "starting coki");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let key = cli
        .api_key
        .filter(|k| !k.trim().is_empty())
        .map(|k| ResolvedKey {
            key: k.trim().to_string(),
            source: KeySource::Prompt,
        });
    let mut app = App::new(config, history, events.sender(), key).with_config_path(config_path);

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    info!("exiting");
    Ok(())
}

fn default_log_path() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("Could not determine cache directory"))?;
    Ok(cache_dir.join("coki").join("coki.log"))
}

/// Logs go to a file; the terminal belongs to the UI.
fn init_logging(verbosity: u8, path: &Path) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(false).with_writer(Mutex::new(file)))
        .with(filter)
        .init();
    Ok(())
}
