pub mod checksum;
pub mod plan;
pub mod record;
pub mod script;
pub mod sql;
pub mod version;

pub use checksum::{procedure_checksum, statements_checksum};
pub use plan::{Plan, PlanStep};
pub use record::AppliedRecord;
pub use script::{Direction, MigrationScript, Procedure, ProcedureError, ScriptBody};
pub use sql::{SplitScript, is_transaction_control, split_statements};
pub use version::{Version, VersionError};

pub use rusqlite::Connection;
pub use sluice_config::VersionScheme;
