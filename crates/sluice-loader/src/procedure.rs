use sluice_core::{Connection, Procedure, ProcedureError};

/// A migration written in Rust and registered with the loader.
///
/// ```no_run
/// use sluice_loader::ProceduralMigration;
///
/// let backfill = ProceduralMigration::new("3", "backfill_emails")
///     .apply(|conn| {
///         conn.execute("UPDATE users SET email = lower(email)", [])?;
///         Ok(())
///     })
///     .revert(|_| Ok(()))
///     .fingerprint("v1");
/// ```
#[derive(Debug, Clone)]
pub struct ProceduralMigration {
    pub(crate) tag: String,
    pub(crate) name: String,
    pub(crate) apply: Option<Procedure>,
    pub(crate) revert: Option<Procedure>,
    pub(crate) fingerprint: String,
}

impl ProceduralMigration {
    pub fn new(tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            apply: None,
            revert: None,
            fingerprint: String::new(),
        }
    }

    pub fn apply<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection) -> Result<(), ProcedureError> + Send + Sync + 'static,
    {
        self.apply = Some(Procedure::new(f));
        self
    }

    pub fn revert<F>(mut self, f: F) -> Self
    where
        F: Fn(&Connection) -> Result<(), ProcedureError> + Send + Sync + 'static,
    {
        self.revert = Some(Procedure::new(f));
        self
    }

    /// Text folded into the checksum. Change it whenever the procedure's
    /// behavior changes so applied databases report drift.
    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    pub(crate) fn label(&self) -> String {
        if self.name.is_empty() {
            format!("procedure {}", self.tag)
        } else {
            format!("procedure {}_{}", self.tag, self.name)
        }
    }
}
