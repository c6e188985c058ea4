use sluice_core::{Version, VersionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Io(#[from] rusqlite::Error),
    #[error("bookkeeping table holds an invalid version: {0}")]
    InvalidVersion(#[from] VersionError),
    #[error("bookkeeping row for version {version} is corrupt: {reason}")]
    CorruptRecord { version: String, reason: String },
    #[error("version {0} is not recorded as applied")]
    NotRecorded(Version),
    #[error("version {0} does not fit in PRAGMA user_version (max {max})", max = i32::MAX)]
    UserVersionOutOfRange(u64),
}
