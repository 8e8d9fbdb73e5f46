//! Configuration view and validation commands: `stockroom config`.

use anyhow::{Context, Result, bail};

use stockroom::config::StockroomToml;

use super::super::{Cli, ConfigCommands};
use super::context::config_path;

pub fn cmd_config(cli: &Cli, config: &StockroomToml, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let rendered =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            // resolve_config already ran validate(); reaching here means it passed.
            let path = config_path(cli);
            if path.exists() {
                println!("{}: valid", path.display());
            } else {
                println!("No config file at {}; defaults are valid", path.display());
            }
        }
        Some(ConfigCommands::Init { force }) => {
            let path = config_path(cli);
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            StockroomToml::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
