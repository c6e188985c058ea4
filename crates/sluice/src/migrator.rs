use rusqlite::Connection;
use sluice_config::SluiceConfig;
use sluice_core::{AppliedRecord, MigrationScript, Plan, Version};
use sluice_executor::{Cancellation, Executor, ExecutorOptions, RunReport, StepReport};
use sluice_loader::{ProceduralMigration, ScriptLoader};
use sluice_planner::{Planner, PlannerError, RevertTarget};
use sluice_store::{LockHolder, StateStore};
use tracing::debug;

use crate::error::Error;

/// Where a run should leave the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Apply pending migrations, up to and including the version when given.
    Up(Option<Version>),
    Down(RevertTarget),
    /// Apply or revert until the version is the head; `None` means the
    /// newest candidate.
    To(Option<Version>),
}

/// Candidates and applied records read at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    scripts: Vec<MigrationScript>,
    applied: Vec<AppliedRecord>,
}

impl Snapshot {
    pub fn scripts(&self) -> &[MigrationScript] {
        &self.scripts
    }

    pub fn applied(&self) -> &[AppliedRecord] {
        &self.applied
    }

    pub fn planner(&self) -> Planner<'_> {
        Planner::new(&self.scripts, &self.applied)
    }

    pub fn plan(&self, target: &Target) -> Result<Plan, PlannerError> {
        let planner = self.planner();
        match target {
            Target::Up(version) => planner.up_plan(version.as_ref()),
            Target::Down(revert) => planner.down_plan(*revert),
            Target::To(version) => planner.plan_to(version.as_ref()),
        }
    }
}

/// One project's migrations bound to one database connection.
///
/// ```no_run
/// use sluice::{Cancellation, Migrator, ProceduralMigration, SluiceConfig, Target};
///
/// let mut migrator = Migrator::open(SluiceConfig::default())?
///     .register(
///         ProceduralMigration::new("4", "seed_roles")
///             .apply(|conn| {
///                 conn.execute("INSERT INTO roles (name) VALUES ('admin')", [])?;
///                 Ok(())
///             })
///             .revert(|conn| {
///                 conn.execute("DELETE FROM roles WHERE name = 'admin'", [])?;
///                 Ok(())
///             }),
///     );
/// migrator.migrate(&Target::Up(None), &Cancellation::new())?;
/// # Ok::<(), sluice::Error>(())
/// ```
pub struct Migrator {
    config: SluiceConfig,
    loader: ScriptLoader,
    store: StateStore,
    conn: Connection,
}

impl Migrator {
    /// Open the database named in the config, creating the file if needed.
    pub fn open(config: SluiceConfig) -> Result<Self, Error> {
        let conn = Connection::open(config.database()).map_err(|source| Error::Open {
            path: config.database().to_path_buf(),
            source,
        })?;
        debug!(database = %config.database().display(), "opened database");
        Ok(Self::with_connection(config, conn))
    }

    pub fn with_connection(config: SluiceConfig, conn: Connection) -> Self {
        Self {
            loader: ScriptLoader::from_config(&config),
            store: StateStore::from_config(&config),
            config,
            conn,
        }
    }

    /// Add a procedural migration to the candidate set.
    pub fn register(mut self, procedure: ProceduralMigration) -> Self {
        self.loader = self.loader.with_procedure(procedure);
        self
    }

    pub fn config(&self) -> &SluiceConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    /// Parse a version tag under the project's scheme.
    pub fn parse_version(&self, tag: &str) -> Result<Version, Error> {
        Ok(Version::parse(tag, self.config.scheme())?)
    }

    /// Load every candidate and the applied set.
    pub fn snapshot(&self) -> Result<Snapshot, Error> {
        let scripts = self.loader.load_all()?;
        let applied = self.store.load(&self.conn)?;
        Ok(Snapshot { scripts, applied })
    }

    pub fn plan(&self, target: &Target) -> Result<Plan, Error> {
        Ok(self.snapshot()?.plan(target)?)
    }

    /// Execute a plan built from a fresh [`Snapshot`]. Fails with
    /// [`sluice_executor::ExecutorError::StalePlan`] when the applied set
    /// moved on before the lock was taken.
    pub fn run(
        &mut self,
        plan: &Plan,
        cancel: &Cancellation,
        progress: impl FnMut(&StepReport),
    ) -> Result<RunReport, Error> {
        let options = ExecutorOptions::from_config(&self.config);
        let mut executor = Executor::new(&mut self.conn, &self.store, options);
        Ok(executor.run(plan, cancel, progress)?)
    }

    /// Plan and run in one go.
    pub fn migrate(&mut self, target: &Target, cancel: &Cancellation) -> Result<RunReport, Error> {
        self.migrate_with(target, cancel, |_| {})
    }

    /// Plan against the applied set read under the run lock, then run.
    ///
    /// Scripts are loaded and validated before the lock is requested. A run
    /// that waited for another invocation plans from what that one left.
    pub fn migrate_with(
        &mut self,
        target: &Target,
        cancel: &Cancellation,
        progress: impl FnMut(&StepReport),
    ) -> Result<RunReport, Error> {
        let scripts = self.loader.load_all()?;
        let options = ExecutorOptions::from_config(&self.config);
        let mut executor = Executor::new(&mut self.conn, &self.store, options);
        executor.run_planned(cancel, progress, |applied| {
            let snapshot = Snapshot {
                scripts,
                applied: applied.to_vec(),
            };
            snapshot.plan(target).map_err(Error::from)
        })
    }

    pub fn lock_holder(&self) -> Result<Option<LockHolder>, Error> {
        Ok(self.store.lock_holder(&self.conn)?)
    }

    /// Remove a lock left behind by a crashed run.
    pub fn unlock(&self) -> Result<Option<LockHolder>, Error> {
        Ok(self.store.force_unlock(&self.conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutorError, LoaderError, Rule};
    use rstest::rstest;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, body: &str) {
        fs::write(dir.join(file), body).unwrap();
    }

    fn project() -> (TempDir, SluiceConfig) {
        let tmp = TempDir::new().unwrap();
        let migrations = tmp.path().join("migrations");
        fs::create_dir_all(&migrations).unwrap();
        write(&migrations, "1_users.up.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY);");
        write(&migrations, "1_users.down.sql", "DROP TABLE users;");
        write(
            &migrations,
            "2_posts.up.sql",
            "-- posts belong to users\nCREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);",
        );
        write(&migrations, "2_posts.down.sql", "DROP TABLE posts;");
        write(
            &migrations,
            "3_index.up.sql",
            "CREATE INDEX posts_user ON posts (user_id);",
        );
        write(&migrations, "3_index.down.sql", "DROP INDEX posts_user;");

        let config = SluiceConfig {
            database: tmp.path().join("app.db"),
            migrations_dir: migrations,
            ..Default::default()
        };
        (tmp, config)
    }

    fn heads(migrator: &Migrator) -> Vec<u64> {
        migrator
            .snapshot()
            .unwrap()
            .applied()
            .iter()
            .filter_map(|r| r.version.as_integer())
            .collect()
    }

    #[rstest]
    #[case::up_all(Target::Up(None), vec![1, 2, 3])]
    #[case::up_to_two(Target::Up(Some(Version::Integer(2))), vec![1, 2])]
    #[case::to_latest(Target::To(None), vec![1, 2, 3])]
    #[case::to_one(Target::To(Some(Version::Integer(1))), vec![1])]
    fn migrate_reaches_target(#[case] target: Target, #[case] expected: Vec<u64>) {
        let (_tmp, config) = project();
        let mut migrator = Migrator::open(config).unwrap();

        migrator.migrate(&target, &Cancellation::new()).unwrap();
        assert_eq!(heads(&migrator), expected);
    }

    #[test]
    fn down_all_after_up_round_trips() {
        let (_tmp, config) = project();
        let mut migrator = Migrator::open(config).unwrap();

        migrator.migrate(&Target::Up(None), &Cancellation::new()).unwrap();
        let report = migrator
            .migrate(&Target::Down(RevertTarget::All), &Cancellation::new())
            .unwrap();

        assert_eq!(
            report.completed,
            vec![Version::Integer(3), Version::Integer(2), Version::Integer(1)]
        );
        assert!(heads(&migrator).is_empty());
    }

    #[test]
    fn migrate_to_lower_version_reverts() {
        let (_tmp, config) = project();
        let mut migrator = Migrator::open(config).unwrap();

        migrator.migrate(&Target::Up(None), &Cancellation::new()).unwrap();
        migrator
            .migrate(&Target::To(Some(Version::Integer(1))), &Cancellation::new())
            .unwrap();
        assert_eq!(heads(&migrator), vec![1]);
    }

    #[test]
    fn edited_script_is_reported_as_drift() {
        let (_tmp, config) = project();
        let migrations = config.migrations_dir.clone();
        let mut migrator = Migrator::open(config).unwrap();
        migrator.migrate(&Target::Up(None), &Cancellation::new()).unwrap();

        write(
            &migrations,
            "2_posts.up.sql",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER, body TEXT);",
        );
        let err = migrator.plan(&Target::Up(None)).unwrap_err();
        assert!(matches!(
            err,
            Error::Planner(PlannerError::Drift { version: Version::Integer(2), .. })
        ));
    }

    #[test]
    fn comment_only_edit_is_not_drift() {
        let (_tmp, config) = project();
        let migrations = config.migrations_dir.clone();
        let mut migrator = Migrator::open(config).unwrap();
        migrator.migrate(&Target::Up(None), &Cancellation::new()).unwrap();

        write(
            &migrations,
            "2_posts.up.sql",
            "-- reworded\nCREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);",
        );
        assert!(migrator.plan(&Target::Up(None)).unwrap().is_empty());
    }

    #[test]
    fn registered_procedure_runs_after_files() {
        let (_tmp, config) = project();
        let mut migrator = Migrator::open(config).unwrap().register(
            ProceduralMigration::new("4", "seed")
                .apply(|conn| {
                    conn.execute("INSERT INTO users (id) VALUES (42)", [])?;
                    Ok(())
                })
                .revert(|conn| {
                    conn.execute("DELETE FROM users WHERE id = 42", [])?;
                    Ok(())
                })
                .fingerprint("seed-v1"),
        );

        migrator.migrate(&Target::Up(None), &Cancellation::new()).unwrap();
        assert_eq!(heads(&migrator), vec![1, 2, 3, 4]);
        let seeded: i64 = migrator
            .connection()
            .query_row("SELECT COUNT(*) FROM users WHERE id = 42", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seeded, 1);

        migrator
            .migrate(&Target::Down(RevertTarget::Latest), &Cancellation::new())
            .unwrap();
        assert_eq!(heads(&migrator), vec![1, 2, 3]);
    }

    #[test]
    fn invalid_script_stops_before_any_run() {
        let (_tmp, config) = project();
        write(&config.migrations_dir, "4_tx.up.sql", "BEGIN;\nSELECT 1;\nCOMMIT;");
        let mut migrator = Migrator::open(config).unwrap();

        let err = migrator
            .migrate(&Target::Up(None), &Cancellation::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Loader(LoaderError::ScriptValidation {
                rule: Rule::TransactionControl,
                ..
            })
        ));
        assert!(heads(&migrator).is_empty());
    }

    #[test]
    fn held_lock_blocks_second_migrator() {
        let (_tmp, config) = project();
        let holder = Migrator::open(config.clone()).unwrap();
        let store = StateStore::from_config(&config);
        store.try_lock(holder.connection()).unwrap().unwrap();

        let mut second = Migrator::open(config).unwrap();
        let err = second
            .migrate(&Target::Up(None), &Cancellation::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Executor(ExecutorError::LockContention { .. })
        ));

        assert!(second.unlock().unwrap().is_some());
        second.migrate(&Target::Up(None), &Cancellation::new()).unwrap();
        assert_eq!(heads(&second), vec![1, 2, 3]);
    }

    #[test]
    fn waiting_run_plans_from_committed_state() {
        let (_tmp, mut config) = project();
        config.lock_timeout_ms = 2000;
        let mut first = Migrator::open(config.clone()).unwrap();
        let mut second = Migrator::open(config).unwrap();

        let stale = second.plan(&Target::Up(None)).unwrap();
        assert_eq!(stale.len(), 3);
        first.migrate(&Target::Up(None), &Cancellation::new()).unwrap();

        let err = second.run(&stale, &Cancellation::new(), |_| {}).unwrap_err();
        assert!(matches!(
            err,
            Error::Executor(ExecutorError::StalePlan { version: Version::Integer(1) })
        ));

        let report = second
            .migrate(&Target::Up(None), &Cancellation::new())
            .unwrap();
        assert!(report.completed.is_empty());
        assert_eq!(heads(&second), vec![1, 2, 3]);
    }

    #[test]
    fn migrate_to_zero_reverts_everything() {
        let (_tmp, config) = project();
        let mut migrator = Migrator::open(config).unwrap();

        migrator.migrate(&Target::Up(None), &Cancellation::new()).unwrap();
        migrator
            .migrate(&Target::To(Some(Version::Integer(0))), &Cancellation::new())
            .unwrap();
        assert!(heads(&migrator).is_empty());
    }

    #[test]
    fn parse_version_uses_project_scheme() {
        let (_tmp, config) = project();
        let migrator = Migrator::with_connection(config, Connection::open_in_memory().unwrap());

        assert_eq!(migrator.parse_version("007").unwrap(), Version::Integer(7));
        assert!(matches!(migrator.parse_version("0"), Err(Error::Version(_))));
    }
}
