use std::thread;
use std::time::{Duration, Instant};

use rusqlite::{Connection, TransactionBehavior};
use sluice_config::{SluiceConfig, TransactionMode};
use sluice_core::{AppliedRecord, Direction, Plan, PlanStep, ScriptBody, Version};
use sluice_store::{LockToken, StateStore, StoreError};
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::error::{ExecutorError, StepError};

const LOCK_RETRY_START: Duration = Duration::from_millis(25);
const LOCK_RETRY_MAX: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorOptions {
    pub transaction_mode: TransactionMode,
    /// `None` fails fast when the lock is taken.
    pub lock_timeout: Option<Duration>,
    pub sync_user_version: bool,
}

impl ExecutorOptions {
    pub fn from_config(config: &SluiceConfig) -> Self {
        Self {
            transaction_mode: config.transaction_mode(),
            lock_timeout: config.lock_timeout(),
            sync_user_version: config.sync_user_version(),
        }
    }
}

/// `Idle -> Running(i) -> Succeeded | Failed(i) | Cancelled(i)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { step: usize },
    Succeeded,
    Failed { step: usize, version: Version },
    /// Stopped before starting `step`.
    Cancelled { step: usize },
}

/// Progress notification, sent once per committed step. In whole-plan
/// mode the notifications follow the final commit.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub index: usize,
    pub total: usize,
    pub version: Version,
    pub name: String,
    pub direction: Direction,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Versions committed by this run, in execution order.
    pub completed: Vec<Version>,
}

/// Applies a [`Plan`] against one connection.
pub struct Executor<'c> {
    conn: &'c mut Connection,
    store: &'c StateStore,
    options: ExecutorOptions,
    state: RunState,
}

impl<'c> Executor<'c> {
    pub fn new(conn: &'c mut Connection, store: &'c StateStore, options: ExecutorOptions) -> Self {
        Self {
            conn,
            store,
            options,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run `plan` to completion, stopping at the first failing step.
    ///
    /// The advisory lock is held for the whole run and released on every
    /// path. Once the lock is held the applied set is read again, and a plan
    /// that no longer matches it fails with [`ExecutorError::StalePlan`].
    /// `progress` is called after each committed step.
    pub fn run(
        &mut self,
        plan: &Plan,
        cancel: &Cancellation,
        mut progress: impl FnMut(&StepReport),
    ) -> Result<RunReport, ExecutorError> {
        self.state = RunState::Idle;
        if plan.is_empty() {
            debug!("nothing to run");
            self.state = RunState::Succeeded;
            return Ok(RunReport { completed: Vec::new() });
        }

        self.locked(|executor: &mut Self| -> Result<RunReport, ExecutorError> {
            let applied = executor.store.load(executor.conn)?;
            ensure_current(plan, &applied)?;
            executor.execute(plan, cancel, &mut progress)
        })
    }

    /// Like [`Executor::run`], but the plan is built by `plan_for` from the
    /// applied set read after the lock is taken, so a run that waited on
    /// another invocation never replays its work.
    pub fn run_planned<E>(
        &mut self,
        cancel: &Cancellation,
        mut progress: impl FnMut(&StepReport),
        plan_for: impl FnOnce(&[AppliedRecord]) -> Result<Plan, E>,
    ) -> Result<RunReport, E>
    where
        E: From<ExecutorError>,
    {
        self.state = RunState::Idle;
        self.locked(|executor: &mut Self| -> Result<RunReport, E> {
            let applied = executor.store.load(executor.conn).map_err(ExecutorError::from)?;
            let plan = plan_for(&applied)?;
            if plan.is_empty() {
                debug!("nothing to run");
                executor.state = RunState::Succeeded;
                return Ok(RunReport { completed: Vec::new() });
            }
            Ok(executor.execute(&plan, cancel, &mut progress)?)
        })
    }

    /// Hold the advisory lock around `body`.
    fn locked<T, E>(&mut self, body: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<ExecutorError>,
    {
        if let Some(timeout) = self.options.lock_timeout {
            self.conn
                .busy_timeout(timeout)
                .map_err(|e| ExecutorError::Store(e.into()))?;
        }
        let token = self.acquire_lock()?;

        let result = body(&mut *self);

        let released = self.store.release_lock(self.conn, token);
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(ExecutorError::from(e).into()),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    warn!(error = %release_err, "failed to release run lock");
                }
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        plan: &Plan,
        cancel: &Cancellation,
        progress: &mut impl FnMut(&StepReport),
    ) -> Result<RunReport, ExecutorError> {
        match self.options.transaction_mode {
            TransactionMode::PerMigration => self.run_per_migration(plan, cancel, progress),
            TransactionMode::WholePlan => self.run_whole_plan(plan, cancel, progress),
        }
    }

    fn acquire_lock(&mut self) -> Result<LockToken, ExecutorError> {
        let started = Instant::now();
        let mut delay = LOCK_RETRY_START;

        loop {
            if let Some(token) = self.store.try_lock(self.conn)? {
                return Ok(token);
            }

            let waited = started.elapsed();
            match self.options.lock_timeout {
                Some(timeout) if waited < timeout => {
                    let pause = delay.min(timeout - waited);
                    warn!(waited_ms = waited.as_millis() as u64, "migration lock is busy, retrying");
                    thread::sleep(pause);
                    delay = (delay * 2).min(LOCK_RETRY_MAX);
                }
                _ => {
                    let owner = self.store.lock_holder(self.conn).ok().flatten().map(|h| h.owner);
                    return Err(ExecutorError::LockContention { owner, waited });
                }
            }
        }
    }

    fn run_per_migration(
        &mut self,
        plan: &Plan,
        cancel: &Cancellation,
        progress: &mut impl FnMut(&StepReport),
    ) -> Result<RunReport, ExecutorError> {
        let total = plan.len();
        let mut completed = Vec::with_capacity(total);

        for (index, step) in plan.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                info!(completed = completed.len(), "run cancelled");
                self.state = RunState::Cancelled { step: index };
                return Err(ExecutorError::Cancelled { completed });
            }

            self.state = RunState::Running { step: index };
            let version = *step.version();
            let started = Instant::now();
            let tx = self
                .conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            let outcome = run_step(&tx, self.store, step, self.options.sync_user_version)
                .and_then(|()| tx.commit().map_err(StepError::from));
            if let Err(cause) = outcome {
                warn!(%version, error = %cause, "migration failed, rolled back");
                self.state = RunState::Failed { step: index, version };
                return Err(ExecutorError::MigrationExecution {
                    version,
                    cause,
                    completed,
                });
            }

            completed.push(version);
            let report = step_report(index, total, step, started.elapsed());
            info!(%version, direction = %step.direction, elapsed_ms = report.elapsed.as_millis() as u64, "migration step committed");
            progress(&report);
        }

        self.state = RunState::Succeeded;
        Ok(RunReport { completed })
    }

    fn run_whole_plan(
        &mut self,
        plan: &Plan,
        cancel: &Cancellation,
        progress: &mut impl FnMut(&StepReport),
    ) -> Result<RunReport, ExecutorError> {
        let total = plan.len();
        let mut done = Vec::with_capacity(total);
        let mut staged = Vec::with_capacity(total);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        for (index, step) in plan.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                tx.commit().map_err(StoreError::from)?;
                staged.iter().for_each(|report| progress(report));
                info!(completed = done.len(), "run cancelled");
                self.state = RunState::Cancelled { step: index };
                return Err(ExecutorError::Cancelled { completed: done });
            }

            self.state = RunState::Running { step: index };
            let version = *step.version();
            let started = Instant::now();
            if let Err(cause) = run_step(&tx, self.store, step, self.options.sync_user_version) {
                drop(tx);
                warn!(%version, error = %cause, "migration failed, whole plan rolled back");
                self.state = RunState::Failed { step: index, version };
                return Err(ExecutorError::MigrationExecution {
                    version,
                    cause,
                    completed: Vec::new(),
                });
            }

            done.push(version);
            staged.push(step_report(index, total, step, started.elapsed()));
        }

        if let Err(e) = tx.commit() {
            let version = done.last().copied().unwrap_or(*plan.steps()[total - 1].version());
            self.state = RunState::Failed { step: total - 1, version };
            return Err(ExecutorError::MigrationExecution {
                version,
                cause: e.into(),
                completed: Vec::new(),
            });
        }
        info!(steps = done.len(), "plan committed");
        staged.iter().for_each(|report| progress(report));
        self.state = RunState::Succeeded;
        Ok(RunReport { completed: done })
    }
}

/// Reject a plan whose steps no longer fit the applied set.
fn ensure_current(plan: &Plan, applied: &[AppliedRecord]) -> Result<(), ExecutorError> {
    for step in plan.steps() {
        let version = *step.version();
        let recorded = applied.iter().any(|r| r.version == version);
        let fits = match step.direction {
            Direction::Apply => !recorded,
            Direction::Revert => recorded,
        };
        if !fits {
            return Err(ExecutorError::StalePlan { version });
        }
    }
    Ok(())
}

fn step_report(index: usize, total: usize, step: &PlanStep, elapsed: Duration) -> StepReport {
    StepReport {
        index,
        total,
        version: *step.version(),
        name: step.script.name.clone(),
        direction: step.direction,
        elapsed,
    }
}

/// Execute one step and update the bookkeeping table on `conn`, which is
/// the open transaction.
fn run_step(
    conn: &Connection,
    store: &StateStore,
    step: &PlanStep,
    sync_user_version: bool,
) -> Result<(), StepError> {
    let script = &step.script;
    debug!(version = %script.version, direction = %step.direction, "running migration step");

    match (&script.body, step.direction) {
        (ScriptBody::Statements { apply, .. }, Direction::Apply) => {
            conn.execute_batch(&apply.join("\n"))?;
        }
        (ScriptBody::Statements { revert, .. }, Direction::Revert) => {
            let revert = revert.as_ref().ok_or(StepError::Irreversible)?;
            conn.execute_batch(&revert.join("\n"))?;
        }
        (ScriptBody::Procedure { apply, .. }, Direction::Apply) => {
            apply.call(conn).map_err(StepError::Procedure)?;
        }
        (ScriptBody::Procedure { revert, .. }, Direction::Revert) => {
            revert.call(conn).map_err(StepError::Procedure)?;
        }
    }

    match step.direction {
        Direction::Apply => {
            store.record(conn, &script.version, &script.name, &script.checksum)?;
        }
        Direction::Revert => store.remove(conn, &script.version)?,
    }
    if sync_user_version {
        store.sync_user_version(conn)?;
    }
    Ok(())
}
