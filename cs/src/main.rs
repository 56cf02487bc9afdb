use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;

use chomkastore::cli::{Cli, Command};
use chomkastore::{DEFAULT_DATA_DIR, PersistenceQueue, StateStore, TaskKind};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

/// Bare words that are not valid JSON are stored as strings
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let dir = cli.dir.unwrap_or_else(|| DEFAULT_DATA_DIR.into());
    let store = StateStore::open(&dir);

    info!("cs starting in {}", dir.display());

    match cli.command {
        Command::Get { key } => match store.get(&key) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                eprintln!("{} No value for key: {}", "✗".red(), key);
                std::process::exit(1);
            }
        },
        Command::Set { key, value } => {
            // Same path the shell takes: one queued task, worker drained before exit
            let queue = PersistenceQueue::spawn()?;
            let value = parse_value(&value);
            let handle = {
                let store = store.clone();
                let key = key.clone();
                queue.submit(TaskKind::SaveState, key.clone(), move || store.save(&key, value))
            };
            queue.shutdown();
            let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
            runtime
                .block_on(handle.wait(std::time::Duration::from_secs(5)))
                .context(format!("Failed to save {}", key))?;
            println!("{} Saved: {}", "✓".green(), key.cyan());
        }
        Command::Read { name } => match store.read_file(&name) {
            Some(content) => println!("{}", content),
            None => {
                eprintln!("{} File not found: {}", "✗".red(), name);
                std::process::exit(1);
            }
        },
        Command::Coords { id, x, y } => {
            store.update_coords(&id, x, y)?;
            println!("{} {} -> {},{}", "✓".green(), id.cyan(), x.trunc(), y.trunc());
        }
        Command::Layout => {
            let cache = store.load_coords();
            if cache.is_empty() {
                println!("No cached positions");
            } else {
                for entry in cache.entries() {
                    println!("{}: {},{}", entry.id.yellow(), entry.x, entry.y);
                }
            }
        }
    }

    Ok(())
}
