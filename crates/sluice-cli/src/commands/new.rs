use std::fs;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use colored::Colorize;
use sluice::{ScriptLoader, Version, VersionScheme};

use crate::utils::{ProjectArgs, migration_stem};

pub fn cmd_new(args: &ProjectArgs, message: String) -> Result<()> {
    let config = args.load()?;
    let existing = ScriptLoader::from_config(&config)
        .file_versions()
        .context("scan existing migrations")?;

    let version = match config.scheme() {
        VersionScheme::Integer => Version::next_integer(existing.last()),
        VersionScheme::Timestamp => Version::timestamp_at(Utc::now().naive_utc()),
    };
    if existing.iter().any(|v| *v == version || v.same_second(&version)) {
        bail!("a migration with version {version} already exists; retry in a second");
    }

    let stem = migration_stem(&version, Some(&message), config.migration_filename_pattern())?;
    let migrations_dir = config.migrations_dir();
    fs::create_dir_all(migrations_dir).context("create migrations directory")?;

    let up = migrations_dir.join(format!("{stem}.up.sql"));
    let down = migrations_dir.join(format!("{stem}.down.sql"));
    let summary = message.lines().next().unwrap_or_default();
    fs::write(&up, format!("-- {summary}\n"))
        .with_context(|| format!("write migration file: {}", up.display()))?;
    fs::write(&down, format!("-- Revert: {summary}\n"))
        .with_context(|| format!("write migration file: {}", down.display()))?;

    println!("{}", "Created migration:".bright_green().bold());
    println!("  {} {}", "Version:".cyan(), version.to_string().bright_magenta());
    println!("  {} {}", "Apply:".cyan(), up.display());
    println!("  {} {}", "Revert:".cyan(), down.display());
    println!("Fill in both scripts before running {}.", "sluice up".bright_white());
    Ok(())
}
