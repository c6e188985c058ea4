use crate::script::{Direction, MigrationScript};
use crate::version::Version;

#[derive(Debug, Clone)]
pub struct PlanStep {
    pub script: MigrationScript,
    pub direction: Direction,
}

impl PlanStep {
    pub fn version(&self) -> &Version {
        &self.script.version
    }
}

/// Ordered, directional sequence of migrations for one run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Versions in execution order.
    pub fn versions(&self) -> Vec<Version> {
        self.steps.iter().map(|s| s.script.version).collect()
    }
}
