//! Shared setup: effective configuration and the ledger service it opens.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use stockroom::config::{CONFIG_FILE_NAME, StockroomToml};
use stockroom::ledger::db::{DbHandle, LedgerDb};
use stockroom::ledger::service::CirculationService;

use super::super::{Cli, Commands, ConfigCommands};

/// Config file the CLI reads: `--config` if given, else `./stockroom.toml`.
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Layer file → environment → CLI flags and validate the result.
pub fn resolve_config(cli: &Cli) -> Result<StockroomToml> {
    let path = config_path(cli);
    let mut config = match &cli.config {
        Some(explicit) => {
            // `config init` is allowed to name a file that does not exist yet.
            let creating = matches!(
                cli.command,
                Commands::Config {
                    command: Some(ConfigCommands::Init { .. })
                }
            );
            if !explicit.exists() && creating {
                StockroomToml::default()
            } else if !explicit.exists() {
                bail!("Config file not found: {}", explicit.display());
            } else {
                StockroomToml::load(explicit)?
            }
        }
        None => StockroomToml::load_or_default(&path)?,
    };

    config.apply_env()?;

    if let Some(db_path) = &cli.db_path {
        config.storage.db_path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Open (and migrate) the configured database.
pub fn open_db(config: &StockroomToml) -> Result<LedgerDb> {
    let db_path = &config.storage.db_path;
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    LedgerDb::new(db_path, config.busy_timeout())
        .with_context(|| format!("Failed to open ledger database at {}", db_path.display()))
}

pub fn open_service(config: &StockroomToml) -> Result<CirculationService> {
    let db = open_db(config)?;
    Ok(CirculationService::new(
        DbHandle::new(db),
        config.ledger_settings(),
    ))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
