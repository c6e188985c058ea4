use std::path::PathBuf;

use sluice_core::VersionError;
use sluice_executor::ExecutorError;
use sluice_loader::LoaderError;
use sluice_planner::PlannerError;
use sluice_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
