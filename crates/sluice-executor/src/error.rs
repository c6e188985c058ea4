use std::time::Duration;

use sluice_core::{ProcedureError, Version};
use sluice_store::StoreError;
use thiserror::Error;

/// Why a single step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error("procedure failed: {0}")]
    Procedure(ProcedureError),
    #[error("migration has no revert body")]
    Irreversible,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A step failed and was rolled back. `completed` lists the versions
    /// committed before it.
    #[error("migration {version} failed: {cause}")]
    MigrationExecution {
        version: Version,
        cause: StepError,
        completed: Vec<Version>,
    },
    #[error("migration lock is held by another run{}", owner.as_deref().map(|o| format!(" ({o})")).unwrap_or_default())]
    LockContention {
        owner: Option<String>,
        waited: Duration,
    },
    /// The applied set changed between planning and taking the lock.
    #[error("plan is out of date: migration {version} changed state since it was planned")]
    StalePlan { version: Version },
    #[error("cancelled after {} completed step(s)", completed.len())]
    Cancelled { completed: Vec<Version> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecutorError {
    /// Versions committed before the run stopped.
    pub fn completed(&self) -> &[Version] {
        match self {
            ExecutorError::MigrationExecution { completed, .. }
            | ExecutorError::Cancelled { completed } => completed,
            _ => &[],
        }
    }
}
