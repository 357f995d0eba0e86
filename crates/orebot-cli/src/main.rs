//! Operator diagnostics for an orebot data directory.
//!
//! This binary provides the `orebot` command with subcommands for
//! inspecting, verifying and repairing a robot's persisted state, plus
//! a watch mode that drives the persistence scheduler until ctrl-c.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orebot_state::{PersistenceScheduler, StateConfig, StateStore, verify_dir};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// orebot — field agent state diagnostics.
#[derive(Parser)]
#[command(
    name = "orebot",
    version,
    about = "orebot — field agent state diagnostics",
    long_about = "Inspect, verify and repair the persisted state of an orebot \
                  field agent, or run the persistence scheduler against a live \
                  data directory."
)]
struct Cli {
    /// Path to the orebot config file.
    #[arg(long, default_value = "orebot.toml")]
    config: PathBuf,

    /// Override the state directory from the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the snapshot chain for every component.
    Status,

    /// Validate every component file; exits non-zero on corruption.
    Verify,

    /// Print the value at a dot-delimited path.
    Get {
        /// Path such as `position.x` or `mining.targets.0`.
        path: String,
    },

    /// Write a value at a dot-delimited path and persist it.
    Set {
        /// Path such as `position.x`.
        path: String,
        /// JSON value; bare words are treated as strings.
        value: String,
    },

    /// Delete the value at a dot-delimited path and persist the change.
    Delete {
        /// Path such as `main.flags.quiet`.
        path: String,
    },

    /// Force recovery of every component from backups.
    Restore,

    /// Reset every component to defaults and persist them.
    Reset,

    /// Run the persistence scheduler until ctrl-c, then flush and exit.
    Watch,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep inspection output clean; watch mode narrates its saves.
    let default_level = if matches!(cli.command, Commands::Watch) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_level);

    let mut config = StateConfig::load(&cli.config).context("failed to load config")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command {
        Commands::Status => cmd_status(&config),
        Commands::Verify => cmd_verify(&config),
        Commands::Get { path } => cmd_get(config, &path),
        Commands::Set { path, value } => cmd_set(config, &path, &value),
        Commands::Delete { path } => cmd_delete(config, &path),
        Commands::Restore => cmd_restore(config),
        Commands::Reset => cmd_reset(config),
        Commands::Watch => cmd_watch(config).await,
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_status(config: &StateConfig) -> Result<()> {
    let report = verify_dir(config);

    println!();
    println!("  State directory: {}", config.data_dir.display());
    println!();
    println!(
        "  {:<12} {:<8} {:<8} {:>9}  backups (newest first)",
        "component", "valid", "schema", "primary"
    );
    for component in &report.components {
        let schema = component
            .schema_version
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        let primary = if component.backups.primary.exists {
            format!("{} B", component.backups.primary.size)
        } else {
            "missing".to_string()
        };
        let slots: Vec<String> = component
            .backups
            .slots
            .iter()
            .map(|slot| {
                if slot.exists {
                    format!("{} B", slot.size)
                } else {
                    "-".to_string()
                }
            })
            .collect();
        println!(
            "  {:<12} {:<8} {:<8} {:>9}  {}",
            component.component,
            if component.valid { "yes" } else { "NO" },
            schema,
            primary,
            slots.join("  "),
        );
    }
    println!();
    Ok(())
}

fn cmd_verify(config: &StateConfig) -> Result<()> {
    let report = verify_dir(config);

    for component in &report.components {
        match &component.error {
            None => println!("  {:<12} ok", component.component),
            Some(error) => println!("  {:<12} CORRUPT: {error}", component.component),
        }
    }

    if !report.all_valid {
        println!();
        println!("  One or more components are invalid; try `orebot restore`.");
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_get(config: StateConfig, path: &str) -> Result<()> {
    let store = StateStore::attach(config).context("failed to load state store")?;
    match store.get(path)? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("(unset)"),
    }
    Ok(())
}

fn cmd_set(config: StateConfig, path: &str, raw: &str) -> Result<()> {
    let mut store = StateStore::attach(config).context("failed to load state store")?;
    store.set(path, parse_value(raw))?;
    store.save().context("failed to persist state")?;
    println!("  {path} set");
    Ok(())
}

fn cmd_delete(config: StateConfig, path: &str) -> Result<()> {
    let mut store = StateStore::attach(config).context("failed to load state store")?;
    let removed = store.delete(path)?;
    store.save().context("failed to persist state")?;
    println!("  {path} {}", if removed { "deleted" } else { "was not set" });
    Ok(())
}

fn cmd_restore(config: StateConfig) -> Result<()> {
    let mut store = StateStore::attach(config).context("failed to load state store")?;
    store.restore();
    let report = store.verify();
    println!(
        "  restore complete; {}",
        if report.all_valid {
            "all components valid"
        } else {
            "some components still invalid"
        }
    );
    Ok(())
}

fn cmd_reset(config: StateConfig) -> Result<()> {
    let mut store = StateStore::attach(config).context("failed to load state store")?;
    store.reset().context("failed to persist defaults")?;
    println!("  all components reset to defaults");
    Ok(())
}

/// Interpret a command-line value: JSON if it parses, a string otherwise,
/// so `orebot set position.x 10` writes a number and
/// `orebot set position.heading east` writes a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn cmd_watch(config: StateConfig) -> Result<()> {
    let store = StateStore::init(config.clone()).context("failed to initialize state store")?;
    let scheduler = PersistenceScheduler::new(config.save_interval());

    let stopper = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.shutdown();
        }
    });

    info!("watching; ctrl-c to flush and exit");
    scheduler.run(&store).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_first() {
        assert_eq!(parse_value("10"), json!(10));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("[1,2]"), json!([1, 2]));
        assert_eq!(parse_value("{\"x\":1}"), json!({"x": 1}));
    }

    #[test]
    fn bare_words_become_strings() {
        assert_eq!(parse_value("east"), json!("east"));
        assert_eq!(parse_value("b-7"), json!("b-7"));
    }
}
