use serde::{Deserialize, Serialize};

/// Version numbering scheme used by a project for its whole lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum VersionScheme {
    /// Strictly positive integers: `1`, `2`, `0042`.
    #[default]
    Integer,
    /// UTC timestamps: `YYYYMMDDHHMMSS` or `YYYYMMDDHHMMSSmmm`.
    Timestamp,
}

impl VersionScheme {
    /// Returns true for the integer scheme.
    pub fn is_integer(self) -> bool {
        matches!(self, VersionScheme::Integer)
    }

    /// Returns true for the timestamp scheme.
    pub fn is_timestamp(self) -> bool {
        matches!(self, VersionScheme::Timestamp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VersionScheme::Integer => "integer",
            VersionScheme::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
