use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheme::VersionScheme;
use crate::transaction_mode::TransactionMode;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "sluice.json";

/// Bookkeeping table holding one row per applied migration (before prefixing).
const MIGRATIONS_TABLE: &str = "sluice_migrations";
/// Single-row table used as the advisory run lock (before prefixing).
const LOCK_TABLE: &str = "sluice_lock";

/// Default migration filename pattern: zero-padded version + sanitized message.
pub fn default_migration_filename_pattern() -> String {
    "%04v_%m".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("sluice.db")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

/// Top-level sluice configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SluiceConfig {
    /// SQLite database file the migrations are applied to.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Directory containing `<version>_<name>.up.sql` / `.down.sql` scripts.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default)]
    pub scheme: VersionScheme,
    /// Reject migrations that cannot be reverted.
    #[serde(default)]
    pub require_revert: bool,
    /// How long to keep retrying the run lock, in milliseconds.
    /// Default: 0 (fail immediately when another run holds it)
    #[serde(default)]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub transaction_mode: TransactionMode,
    /// Prefix added to the bookkeeping and lock table names.
    /// Default: "" (no prefix)
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_migration_filename_pattern")]
    pub migration_filename_pattern: String,
    /// Mirror the highest applied integer version into `PRAGMA user_version`.
    #[serde(default)]
    pub sync_user_version: bool,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            migrations_dir: default_migrations_dir(),
            scheme: VersionScheme::Integer,
            require_revert: false,
            lock_timeout_ms: 0,
            transaction_mode: TransactionMode::PerMigration,
            prefix: String::new(),
            migration_filename_pattern: default_migration_filename_pattern(),
            sync_user_version: false,
        }
    }
}

impl SluiceConfig {
    /// Path of the target database.
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Path where migrations are stored.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Version scheme of the project.
    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    /// Whether every migration must ship a revert body.
    pub fn require_revert(&self) -> bool {
        self.require_revert
    }

    /// Bounded wait for the run lock; `None` means fail fast.
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }

    /// Transaction boundary for executor runs.
    pub fn transaction_mode(&self) -> TransactionMode {
        self.transaction_mode
    }

    /// Pattern for migration filenames (supports %v, %0Nv and %m placeholders).
    pub fn migration_filename_pattern(&self) -> &str {
        &self.migration_filename_pattern
    }

    /// Prefix added to sluice's own tables.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `PRAGMA user_version` follows the applied head.
    pub fn sync_user_version(&self) -> bool {
        self.sync_user_version
    }

    /// Apply prefix to a table name.
    pub fn apply_prefix(&self, table_name: &str) -> String {
        if self.prefix.is_empty() {
            table_name.to_string()
        } else {
            format!("{}{}", self.prefix, table_name)
        }
    }

    /// Name of the bookkeeping table, prefix included.
    pub fn migrations_table(&self) -> String {
        self.apply_prefix(MIGRATIONS_TABLE)
    }

    /// Name of the advisory lock table, prefix included.
    pub fn lock_table(&self) -> String {
        self.apply_prefix(LOCK_TABLE)
    }
}
