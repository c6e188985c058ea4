//! Ordered, versioned migrations for SQLite.
//!
//! [`Migrator`] ties the pieces together: scripts come from the
//! [`ScriptLoader`], applied state from the [`StateStore`], plans from the
//! [`Planner`] and the [`Executor`] runs them.

pub mod error;
pub mod migrator;

pub use error::Error;
pub use migrator::{Migrator, Snapshot, Target};

pub use sluice_config::{CONFIG_FILE, SluiceConfig, TransactionMode, VersionScheme};
pub use sluice_core::{
    AppliedRecord, Direction, MigrationScript, Plan, PlanStep, ScriptBody, Version, VersionError,
};
pub use sluice_executor::{
    Cancellation, Executor, ExecutorError, ExecutorOptions, RunReport, RunState, StepError,
    StepReport,
};
pub use sluice_loader::{LoaderError, ProceduralMigration, Rule, ScriptLoader};
pub use sluice_planner::{Planner, PlannerError, RevertTarget, Status};
pub use sluice_store::{LockHolder, StateStore, StoreError};
