use sluice_core::Version;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("drift in migration {version}: recorded checksum {recorded}, script now hashes to {current}")]
    Drift {
        version: Version,
        recorded: String,
        current: String,
    },
    #[error("migration {0} is recorded as applied but has no script")]
    Orphaned(Version),
    #[error("cannot revert migration {0}: no script found")]
    MissingScript(Version),
    #[error("cannot revert migration {0}: it has no revert body")]
    MissingRevert(Version),
}

impl PlannerError {
    /// Version the error is about.
    pub fn version(&self) -> &Version {
        match self {
            PlannerError::Drift { version, .. } => version,
            PlannerError::Orphaned(v) | PlannerError::MissingScript(v) | PlannerError::MissingRevert(v) => v,
        }
    }
}
