use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;

use crate::version::Version;

/// Error returned by a procedural migration unit.
pub type ProcedureError = Box<dyn std::error::Error + Send + Sync>;

type ProcedureFn = dyn Fn(&Connection) -> Result<(), ProcedureError> + Send + Sync;

/// A unit of procedural migration logic.
///
/// It receives the open transaction as its only argument and must not
/// commit or roll back on its own.
#[derive(Clone)]
pub struct Procedure(Arc<ProcedureFn>);

impl Procedure {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Connection) -> Result<(), ProcedureError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, conn: &Connection) -> Result<(), ProcedureError> {
        (self.0)(conn)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Procedure(..)")
    }
}

/// What a migration executes.
#[derive(Debug, Clone)]
pub enum ScriptBody {
    /// Raw statements, each ending with `;`. `revert` is `None` when no
    /// down script exists.
    Statements {
        apply: Vec<String>,
        revert: Option<Vec<String>>,
    },
    Procedure {
        apply: Procedure,
        revert: Procedure,
    },
}

impl ScriptBody {
    pub fn is_procedural(&self) -> bool {
        matches!(self, ScriptBody::Procedure { .. })
    }

    /// Whether the body can be run in the [`Direction::Revert`] direction.
    pub fn is_reversible(&self) -> bool {
        match self {
            ScriptBody::Statements { revert, .. } => revert.is_some(),
            ScriptBody::Procedure { .. } => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Apply,
    Revert,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Apply => f.write_str("apply"),
            Direction::Revert => f.write_str("revert"),
        }
    }
}

/// A validated, checksummed migration.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub version: Version,
    pub name: String,
    pub body: ScriptBody,
    /// Lowercase hex SHA-256 of the body, computed at load time.
    pub checksum: String,
    /// Apply file for directory scripts; `None` for registered procedures.
    pub path: Option<PathBuf>,
}

impl MigrationScript {
    /// Human-readable identifier, e.g. `3_add_index`.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.version.to_string()
        } else {
            format!("{}_{}", self.version, self.name)
        }
    }
}
