//! Chomka - desktop shell host
//!
//! Runs as a sidecar of the window process, speaking JSON lines on
//! stdin/stdout.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use chomka::bridge::Bridge;
use chomka::cli::{Cli, Command};
use chomka::config::Config;
use chomka::host::{self, StdioHost};
use chomka::{LifecycleController, ShellApi};
use chomkastore::{DESKTOP_FILE, DESKTOP_ITEMS_KEY, StateStore};

/// Emergency log in the working directory, for failures before or after logging works
const CRASH_LOG: &str = "chomka_crash.log";

const LOG_FILE: &str = "chomka.log";

fn setup_logging(log_dir: &Path, cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Best effort: append the failure to the crash log
fn write_crash_log(error: &eyre::Report) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let written = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(CRASH_LOG)
        .and_then(|mut f| writeln!(f, "[{}] CRITICAL: {:?}", timestamp, error));
    if let Err(e) = written {
        eprintln!("Failed to write {}: {}", CRASH_LOG, e);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = ?e, "Fatal error");
            write_crash_log(&e);
            eprintln!("{} {:?}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Log level from config file first; logging needs the data dir
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let (mut config, config_path) = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let cwd = std::env::current_dir().context("Failed to get working directory")?;
    config.data_dir = config.resolved_data_dir(&cwd);

    let config_level = config.log_level.clone().or(config_log_level);
    setup_logging(&config.data_dir, cli.log_level.as_deref(), config_level.as_deref())
        .context("Failed to setup logging")?;
    info!(data_dir = %config.data_dir.display(), config = %config_path.display(), "Chomka starting");

    debug!(command = ?cli.command, "run: dispatching command");
    match cli.command {
        None | Some(Command::Run) => cmd_run(config, config_path).await,
        Some(Command::State { key }) => cmd_state(&config.data_dir, &key),
        Some(Command::Layout) => cmd_layout(&config.data_dir),
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn cmd_run(config: Config, config_path: PathBuf) -> Result<()> {
    let host = Arc::new(StdioHost::stdout());
    let bridge: Arc<dyn Bridge> = host.clone();
    let lifecycle = LifecycleController::new(Arc::clone(&bridge), config.lifecycle.clone(), Handle::current());
    let api = ShellApi::new(config, config_path, bridge, lifecycle).context("Failed to start persistence queue")?;

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let outcome = host::serve(Arc::new(api), host, input, interrupted()).await?;

    // Queued fire-and-forget writes are abandoned here
    info!(?outcome, "Chomka exiting");
    Ok(())
}

fn cmd_state(data_dir: &Path, key: &str) -> Result<()> {
    let store = StateStore::open(data_dir);
    match store.get(key) {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => {
            eprintln!("{} No value for key: {}", "✗".red(), key);
            std::process::exit(1);
        }
    }
}

fn cmd_layout(data_dir: &Path) -> Result<()> {
    let store = StateStore::open(data_dir);

    let items = match store.get(DESKTOP_ITEMS_KEY) {
        Some(Value::Array(items)) => items,
        _ => match store.read_file(DESKTOP_FILE).map(|c| serde_json::from_str::<Value>(&c)) {
            Some(Ok(Value::Array(items))) => items,
            _ => Vec::new(),
        },
    };

    if items.is_empty() {
        println!("No desktop items");
        return Ok(());
    }

    for item in &items {
        let id = match &item["id"] {
            Value::String(s) => s.clone(),
            Value::Null => "?".to_string(),
            other => other.to_string(),
        };
        println!("{}: {},{}", id.yellow(), item["x"], item["y"]);
    }
    println!("{} {} items", "✓".green(), items.len());
    Ok(())
}
