use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sluice_config::{CONFIG_FILE, SluiceConfig};

/// Load config from a specific path.
///
/// A missing file points the user at `sluice init`.
pub fn load_config_from_path(path: PathBuf) -> Result<SluiceConfig> {
    if !path.exists() {
        anyhow::bail!("{} not found. Run 'sluice init' first.", path.display());
    }

    let content =
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let config: SluiceConfig =
        serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_config::VersionScheme;
    use tempfile::TempDir;

    #[test]
    fn missing_file_suggests_init() {
        let tmp = TempDir::new().unwrap();
        let err = load_config_from_path(tmp.path().join(CONFIG_FILE)).unwrap_err();
        assert!(err.to_string().contains("Run 'sluice init' first"));
    }

    #[test]
    fn reads_camel_case_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"scheme":"timestamp","requireRevert":true}"#).unwrap();

        let config = load_config_from_path(path).unwrap();
        assert_eq!(config.scheme(), VersionScheme::Timestamp);
        assert!(config.require_revert());
    }

    #[test]
    fn reports_parse_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        let err = load_config_from_path(path).unwrap_err();
        assert!(err.to_string().starts_with("parse "));
    }
}
