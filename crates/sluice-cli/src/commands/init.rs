use std::fs;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use sluice_config::{SluiceConfig, VersionScheme};

use crate::utils::ProjectArgs;

pub fn cmd_init(args: &ProjectArgs, scheme: Option<VersionScheme>) -> Result<()> {
    let path = &args.config;
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    let mut config = SluiceConfig::default();
    args.apply(&mut config);
    if let Some(scheme) = scheme {
        config.scheme = scheme;
    }

    let json = serde_json::to_string_pretty(&config).context("serialize default config")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    fs::create_dir_all(config.migrations_dir()).context("create migrations directory")?;

    println!("{} {}", "Created".bright_green(), path.display());
    println!(
        "  {} {}",
        "Migrations directory:".cyan(),
        config.migrations_dir().display().to_string().bright_white()
    );
    println!("  {} {}", "Version scheme:".cyan(), config.scheme().as_str().bright_white());
    Ok(())
}
