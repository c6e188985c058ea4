use std::collections::BTreeMap;

use sluice_core::{AppliedRecord, Direction, MigrationScript, Plan, PlanStep, Version};
use tracing::{debug, warn};

use crate::error::PlannerError;
use crate::status::Status;

/// How far a down-plan goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertTarget {
    /// Only the most recently applied migration.
    Latest,
    /// Every applied version greater than or equal to this one.
    Through(Version),
    All,
}

/// Reconciles the candidate set with the applied set.
///
/// Versions are the only ordering key; duplicates must have been rejected
/// by the loader.
#[derive(Debug)]
pub struct Planner<'a> {
    candidates: BTreeMap<Version, &'a MigrationScript>,
    applied: &'a [AppliedRecord],
}

impl<'a> Planner<'a> {
    pub fn new(candidates: &'a [MigrationScript], applied: &'a [AppliedRecord]) -> Self {
        Self {
            candidates: candidates.iter().map(|s| (s.version, s)).collect(),
            applied,
        }
    }

    /// Highest applied version.
    pub fn head(&self) -> Option<Version> {
        self.applied.iter().map(|r| r.version).max()
    }

    /// Every consistency problem, in version order.
    pub fn issues(&self) -> Vec<PlannerError> {
        let mut applied: Vec<&AppliedRecord> = self.applied.iter().collect();
        applied.sort_by_key(|r| r.version);

        applied
            .into_iter()
            .filter_map(|record| match self.candidates.get(&record.version) {
                None => Some(PlannerError::Orphaned(record.version)),
                Some(script) if script.checksum != record.checksum => Some(PlannerError::Drift {
                    version: record.version,
                    recorded: record.checksum.clone(),
                    current: script.checksum.clone(),
                }),
                Some(_) => None,
            })
            .collect()
    }

    /// First consistency problem, if any.
    pub fn check_consistency(&self) -> Result<(), PlannerError> {
        match self.issues().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Candidates newer than the head, up to and including `target`.
    pub fn up_plan(&self, target: Option<&Version>) -> Result<Plan, PlannerError> {
        self.check_consistency()?;
        let head = self.head();
        self.warn_ignored(head.as_ref());

        let steps: Vec<PlanStep> = self
            .candidates
            .values()
            .filter(|s| head.is_none_or(|h| s.version > h))
            .filter(|s| target.is_none_or(|t| s.version <= *t))
            .map(|s| PlanStep {
                script: (*s).clone(),
                direction: Direction::Apply,
            })
            .collect();

        debug!(steps = steps.len(), "built up-plan");
        Ok(Plan::new(steps))
    }

    /// Applied versions selected by `target`, newest first.
    pub fn down_plan(&self, target: RevertTarget) -> Result<Plan, PlannerError> {
        self.check_consistency()?;
        let plan = match target {
            RevertTarget::Latest => {
                let head = self.head();
                self.revert_where(|v| Some(v) == head.as_ref())?
            }
            RevertTarget::Through(floor) => self.revert_where(|v| *v >= floor)?,
            RevertTarget::All => self.revert_where(|_| true)?,
        };
        debug!(steps = plan.len(), "built down-plan");
        Ok(plan)
    }

    /// Move the database to `target`: apply up to it when it is ahead of the
    /// head, otherwise revert everything above it. `None` means the newest
    /// candidate.
    pub fn plan_to(&self, target: Option<&Version>) -> Result<Plan, PlannerError> {
        match (target, self.head()) {
            (Some(t), Some(head)) if *t <= head => {
                self.check_consistency()?;
                self.revert_where(|v| v > t)
            }
            _ => self.up_plan(target),
        }
    }

    pub fn status(&self) -> Status<'a> {
        let head = self.head();
        let (pending, ignored): (Vec<_>, Vec<_>) = self
            .candidates
            .values()
            .copied()
            .filter(|s| !self.is_applied(&s.version))
            .partition(|s| head.is_none_or(|h| s.version > h));

        let mut applied: Vec<&'a AppliedRecord> = self.applied.iter().collect();
        applied.sort_by_key(|r| r.version);

        Status {
            applied: applied
                .into_iter()
                .map(|r| (r, self.candidates.get(&r.version).copied()))
                .collect(),
            pending,
            ignored,
            issues: self.issues(),
        }
    }

    fn is_applied(&self, version: &Version) -> bool {
        self.applied.iter().any(|r| r.version == *version)
    }

    fn warn_ignored(&self, head: Option<&Version>) {
        let Some(head) = head else { return };
        for script in self.candidates.range(..*head).map(|(_, s)| s) {
            if !self.is_applied(&script.version) {
                warn!(
                    version = %script.version,
                    head = %head,
                    "unapplied migration is older than the applied head and will be skipped"
                );
            }
        }
    }

    /// Revert steps for the applied versions matching `select`, newest first.
    pub(crate) fn revert_where(&self, select: impl Fn(&Version) -> bool) -> Result<Plan, PlannerError> {
        let mut versions: Vec<Version> = self
            .applied
            .iter()
            .map(|r| r.version)
            .filter(|v| select(v))
            .collect();
        versions.sort_by(|a, b| b.cmp(a));

        let steps = versions
            .into_iter()
            .map(|version| {
                let script = self
                    .candidates
                    .get(&version)
                    .ok_or(PlannerError::MissingScript(version))?;
                if !script.body.is_reversible() {
                    return Err(PlannerError::MissingRevert(version));
                }
                Ok(PlanStep {
                    script: (*script).clone(),
                    direction: Direction::Revert,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Plan::new(steps))
    }
}
