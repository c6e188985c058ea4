use chrono::{DateTime, Utc};

use crate::version::Version;

/// One row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRecord {
    pub version: Version,
    pub name: String,
    /// Checksum of the script at the time it was applied.
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}
