use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use sluice_config::SluiceConfig;
use sluice_core::{AppliedRecord, Version, VersionScheme};
use tracing::debug;

use crate::error::StoreError;

/// Owner of sluice's bookkeeping table.
///
/// The store keeps no connection of its own; every call takes the handle
/// to work on, so `record` and `remove` join whatever transaction the
/// caller has open.
#[derive(Debug, Clone)]
pub struct StateStore {
    scheme: VersionScheme,
    table: String,
    lock_table: String,
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl StateStore {
    pub fn new(scheme: VersionScheme, table: impl Into<String>, lock_table: impl Into<String>) -> Self {
        Self {
            scheme,
            table: table.into(),
            lock_table: lock_table.into(),
        }
    }

    pub fn from_config(config: &SluiceConfig) -> Self {
        Self::new(config.scheme(), config.migrations_table(), config.lock_table())
    }

    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn lock_table(&self) -> &str {
        &self.lock_table
    }

    /// Create the bookkeeping and lock tables when absent.
    pub fn ensure_tables(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                owner TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            );",
            quote_ident(&self.table),
            quote_ident(&self.lock_table),
        ))?;
        Ok(())
    }

    /// Applied records sorted by version.
    pub fn load(&self, conn: &Connection) -> Result<Vec<AppliedRecord>, StoreError> {
        self.ensure_tables(conn)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT version, name, checksum, applied_at FROM {}",
            quote_ident(&self.table)
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = rows
            .into_iter()
            .map(|(version, name, checksum, applied_at)| {
                let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                    .map_err(|e| StoreError::CorruptRecord {
                        version: version.clone(),
                        reason: format!("applied_at '{applied_at}': {e}"),
                    })?
                    .with_timezone(&Utc);
                Ok(AppliedRecord {
                    version: Version::parse(&version, self.scheme)?,
                    name,
                    checksum,
                    applied_at,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        records.sort_by_key(|r| r.version);
        debug!(table = %self.table, applied = records.len(), "loaded bookkeeping table");
        Ok(records)
    }

    /// Insert one applied record on the caller's transaction.
    pub fn record(
        &self,
        conn: &Connection,
        version: &Version,
        name: &str,
        checksum: &str,
    ) -> Result<AppliedRecord, StoreError> {
        let applied_at = Utc::now();
        conn.execute(
            &format!(
                "INSERT INTO {} (version, name, checksum, applied_at) VALUES (?1, ?2, ?3, ?4)",
                quote_ident(&self.table)
            ),
            params![
                version.to_string(),
                name,
                checksum,
                applied_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )?;
        debug!(%version, "recorded applied migration");
        Ok(AppliedRecord {
            version: *version,
            name: name.to_string(),
            checksum: checksum.to_string(),
            applied_at,
        })
    }

    /// Delete one applied record on the caller's transaction.
    pub fn remove(&self, conn: &Connection, version: &Version) -> Result<(), StoreError> {
        let deleted = conn.execute(
            &format!("DELETE FROM {} WHERE version = ?1", quote_ident(&self.table)),
            params![version.to_string()],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotRecorded(*version));
        }
        debug!(%version, "removed applied migration");
        Ok(())
    }

    /// Mirror the highest applied integer version into `PRAGMA user_version`.
    ///
    /// No-op under the timestamp scheme. `user_version` is a signed 32-bit
    /// field, so a larger head fails instead of being truncated.
    pub fn sync_user_version(&self, conn: &Connection) -> Result<(), StoreError> {
        if !self.scheme.is_integer() {
            return Ok(());
        }
        let head = self
            .load(conn)?
            .last()
            .and_then(|r| r.version.as_integer())
            .unwrap_or(0);
        let value = i32::try_from(head).map_err(|_| StoreError::UserVersionOutOfRange(head))?;
        conn.pragma_update(None, "user_version", value)?;
        Ok(())
    }
}
