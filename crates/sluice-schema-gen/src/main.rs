use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use schemars::schema_for;
use sluice_config::SluiceConfig;

const SCHEMA_FILE: &str = "config.schema.json";

#[derive(Debug, Parser)]
#[command(name = "sluice-schema-gen", about = "Emit the JSON Schema of sluice.json.")]
struct Args {
    /// Output directory for the schema file.
    #[arg(short = 'o', long = "out", default_value = "schemas")]
    out: PathBuf,
    /// Fail instead of writing when the file on disk is stale.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.check { check(&args.out) } else { run(&args.out) }
}

fn render() -> Result<String> {
    let schema = schema_for!(SluiceConfig);
    let mut text = serde_json::to_string_pretty(&schema).context("serialize config schema")?;
    text.push('\n');
    Ok(text)
}

fn run(out: &Path) -> Result<()> {
    if !out.exists() {
        fs::create_dir_all(out).with_context(|| format!("create dir {}", out.display()))?;
    }

    let path = out.join(SCHEMA_FILE);
    fs::write(&path, render()?).with_context(|| format!("write {}", path.display()))?;

    println!("Wrote schema:");
    println!("  {}", path.display());
    Ok(())
}

fn check(out: &Path) -> Result<()> {
    let path = out.join(SCHEMA_FILE);
    let on_disk = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    if on_disk != render()? {
        bail!("{} is out of date; rerun sluice-schema-gen", path.display());
    }
    println!("{} is up to date", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn run_creates_output_directory_if_not_exists() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("nested").join("schemas");

        assert!(!out.exists());
        run(&out).unwrap();
        assert!(out.join(SCHEMA_FILE).exists());
    }

    #[test]
    fn schema_names_every_config_key() {
        let temp_dir = TempDir::new().unwrap();
        run(temp_dir.path()).unwrap();

        let content = fs::read_to_string(temp_dir.path().join(SCHEMA_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["title"], "SluiceConfig");
        for key in [
            "database",
            "migrationsDir",
            "scheme",
            "requireRevert",
            "lockTimeoutMs",
            "transactionMode",
            "prefix",
            "migrationFilenamePattern",
            "syncUserVersion",
        ] {
            assert!(value["properties"].get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn check_passes_after_run_and_fails_on_edit() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path();

        assert!(check(out).is_err());
        run(out).unwrap();
        check(out).unwrap();

        fs::write(out.join(SCHEMA_FILE), "{}").unwrap();
        let err = check(out).unwrap_err();
        assert!(err.to_string().contains("out of date"));
    }
}
