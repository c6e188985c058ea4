use sluice_core::{AppliedRecord, MigrationScript};

use crate::error::PlannerError;

/// Read-only view of applied versus pending migrations.
#[derive(Debug)]
pub struct Status<'a> {
    /// Applied records in version order, with their script when one exists.
    pub applied: Vec<(&'a AppliedRecord, Option<&'a MigrationScript>)>,
    /// Unapplied candidates newer than the head; `up` will run these.
    pub pending: Vec<&'a MigrationScript>,
    /// Unapplied candidates older than the head; `up` skips these.
    pub ignored: Vec<&'a MigrationScript>,
    pub issues: Vec<PlannerError>,
}

impl Status<'_> {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}
