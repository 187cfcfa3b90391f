//! `quay config`: inspect and initialize configuration.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use quay_config::{QuayConfig, save_config, xdg_config_path};

use super::Context;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Validate the configuration and print the resolved durations
    Check,

    /// Write a default configuration file
    Init {
        /// Target path (default: $XDG_CONFIG_HOME/quay/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = ctx.load_config()?;
            print!("{}", config.to_toml()?);
        }
        ConfigCommand::Check => {
            let config = ctx.load_config()?;
            println!("{}", describe(&config));
        }
        ConfigCommand::Init { path, force } => {
            let path = match path.or_else(xdg_config_path) {
                Some(path) => path,
                None => bail!("no config directory available, pass --path"),
            };
            if path.exists() && !force {
                bail!("{} already exists, pass --force to overwrite", path.display());
            }
            save_config(&QuayConfig::default(), &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn describe(config: &QuayConfig) -> String {
    let settings = config.session_settings();
    let sweep = if settings.sweep_enabled {
        format!(
            "first after {:?}, then every {:?}",
            settings.initial_check_delay, settings.check_period
        )
    } else {
        "disabled".to_string()
    };
    let capacity = match config.store.max_entries {
        0 => "unbounded".to_string(),
        n => n.to_string(),
    };

    format!(
        "session timeout: {:?}\ntransactional:   {}\nsweep:           {}\nstore capacity:  {}",
        settings.expiration_time, settings.transactional, sweep, capacity
    )
}
