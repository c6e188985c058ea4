use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sluice_config::SluiceConfig;
use sluice_core::{
    MigrationScript, ScriptBody, Version, VersionScheme, is_transaction_control,
    procedure_checksum, split_statements, statements_checksum,
};
use tracing::debug;

use crate::error::{LoaderError, Rule};
use crate::procedure::ProceduralMigration;

/// `<tag>[_<name>].(up|down).sql`
static FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<tag>\d+)(?:_(?P<name>[A-Za-z0-9_-]+))?\.(?P<dir>up|down)\.sql$")
        .expect("filename pattern is a valid regex")
});

/// Discovers migration scripts in a directory plus procedures registered in code.
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    dir: PathBuf,
    scheme: VersionScheme,
    require_revert: bool,
    procedures: Vec<ProceduralMigration>,
}

#[derive(Debug)]
enum Candidate<'a> {
    Files {
        tag: String,
        name: String,
        up: Option<PathBuf>,
        down: Option<PathBuf>,
    },
    BadFilename(PathBuf),
    Procedure(&'a ProceduralMigration),
}

/// Lazy sequence of validated scripts, in discovery order.
///
/// File contents are read only when the iterator reaches them. Call
/// [`ScriptLoader::scripts`] again to start over.
#[derive(Debug)]
pub struct Scripts<'a> {
    loader: &'a ScriptLoader,
    pending: std::vec::IntoIter<Candidate<'a>>,
    seen: HashMap<Version, String>,
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl ScriptLoader {
    pub fn new(dir: impl Into<PathBuf>, scheme: VersionScheme) -> Self {
        Self {
            dir: dir.into(),
            scheme,
            require_revert: false,
            procedures: Vec::new(),
        }
    }

    pub fn from_config(config: &SluiceConfig) -> Self {
        Self::new(config.migrations_dir(), config.scheme()).require_revert(config.require_revert())
    }

    /// Reject migrations that cannot be reverted.
    pub fn require_revert(mut self, require: bool) -> Self {
        self.require_revert = require;
        self
    }

    /// Register a procedural migration. Procedures follow the directory
    /// scripts in discovery order.
    pub fn with_procedure(mut self, procedure: ProceduralMigration) -> Self {
        self.procedures.push(procedure);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    /// List the candidates and return a lazy iterator over them.
    ///
    /// A missing directory yields only the registered procedures.
    pub fn scripts(&self) -> Result<Scripts<'_>, LoaderError> {
        let mut candidates = Vec::new();
        let mut by_stem: HashMap<String, usize> = HashMap::new();

        for path in self.list_sql_files()? {
            let file_name = file_label(&path);
            let Some(caps) = FILENAME.captures(&file_name) else {
                candidates.push(Candidate::BadFilename(path));
                continue;
            };

            let tag = caps["tag"].to_string();
            let name = caps.name("name").map(|m| m.as_str()).unwrap_or_default().to_string();
            let stem = format!("{tag}_{name}");
            let idx = *by_stem.entry(stem).or_insert_with(|| {
                candidates.push(Candidate::Files {
                    tag,
                    name,
                    up: None,
                    down: None,
                });
                candidates.len() - 1
            });

            if let Candidate::Files { up, down, .. } = &mut candidates[idx] {
                match &caps["dir"] {
                    "up" => *up = Some(path),
                    _ => *down = Some(path),
                }
            }
        }

        candidates.extend(self.procedures.iter().map(Candidate::Procedure));
        debug!(dir = %self.dir.display(), candidates = candidates.len(), "listed migration candidates");

        Ok(Scripts {
            loader: self,
            pending: candidates.into_iter(),
            seen: HashMap::new(),
        })
    }

    /// Load and validate every script, failing on the first error.
    pub fn load_all(&self) -> Result<Vec<MigrationScript>, LoaderError> {
        self.scripts()?.collect()
    }

    /// Versions named by the directory's filenames, sorted and deduplicated.
    ///
    /// Contents are not read, so unfinished scripts do not get in the way.
    /// Files outside the filename grammar are skipped.
    pub fn file_versions(&self) -> Result<Vec<Version>, LoaderError> {
        let mut versions = Vec::new();
        for path in self.list_sql_files()? {
            let file_name = file_label(&path);
            let Some(caps) = FILENAME.captures(&file_name) else {
                continue;
            };
            let version = Version::parse(&caps["tag"], self.scheme).map_err(|source| {
                LoaderError::InvalidVersion {
                    script: file_name.clone(),
                    source,
                }
            })?;
            versions.push(version);
        }
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    fn list_sql_files(&self) -> Result<Vec<PathBuf>, LoaderError> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "migrations directory does not exist");
            return Ok(Vec::new());
        }

        let io_err = |source| LoaderError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("sql") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Scripts<'_> {
    fn load(&mut self, candidate: Candidate<'_>) -> Result<MigrationScript, LoaderError> {
        match candidate {
            Candidate::BadFilename(path) => Err(LoaderError::validation(
                file_label(&path),
                Rule::FilenameGrammar,
                "expected <version>_<name>.up.sql or <version>_<name>.down.sql",
            )),
            Candidate::Files {
                tag,
                name,
                up,
                down,
            } => self.load_files(tag, name, up, down),
            Candidate::Procedure(procedure) => self.load_procedure(procedure),
        }
    }

    /// Parse the tag and check it against everything discovered so far.
    fn claim_version(&mut self, tag: &str, label: &str) -> Result<Version, LoaderError> {
        let version =
            Version::parse(tag, self.loader.scheme).map_err(|source| LoaderError::InvalidVersion {
                script: label.to_string(),
                source,
            })?;

        if let Some(first) = self.seen.get(&version) {
            return Err(LoaderError::DuplicateVersion {
                version,
                first: first.clone(),
                second: label.to_string(),
            });
        }
        if let Some((other, first)) = self.seen.iter().find(|(v, _)| v.same_second(&version)) {
            return Err(LoaderError::validation(
                label,
                Rule::TimestampCollision,
                format!("{version} and {other} ({first}) fall in the same second"),
            ));
        }

        self.seen.insert(version, label.to_string());
        Ok(version)
    }

    fn load_files(
        &mut self,
        tag: String,
        name: String,
        up: Option<PathBuf>,
        down: Option<PathBuf>,
    ) -> Result<MigrationScript, LoaderError> {
        let Some(up) = up else {
            let label = down.as_deref().map(file_label).unwrap_or_default();
            return Err(LoaderError::validation(
                label,
                Rule::MissingApply,
                "revert script has no matching .up.sql",
            ));
        };
        let label = file_label(&up);
        let version = self.claim_version(&tag, &label)?;

        let apply = read_statements(&up)?;
        let revert = match &down {
            Some(path) => Some(read_statements(path)?),
            None if self.loader.require_revert => {
                return Err(LoaderError::MissingRevert { script: label });
            }
            None => None,
        };

        let checksum = statements_checksum(&apply, revert.as_deref());
        debug!(%version, script = %label, statements = apply.len(), "loaded migration script");
        Ok(MigrationScript {
            version,
            name,
            body: ScriptBody::Statements { apply, revert },
            checksum,
            path: Some(up),
        })
    }

    fn load_procedure(&mut self, procedure: &ProceduralMigration) -> Result<MigrationScript, LoaderError> {
        let label = procedure.label();
        let version = self.claim_version(&procedure.tag, &label)?;

        let Some(apply) = procedure.apply.clone() else {
            return Err(LoaderError::validation(label, Rule::MissingApply, "no apply unit registered"));
        };
        let Some(revert) = procedure.revert.clone() else {
            if self.loader.require_revert {
                return Err(LoaderError::MissingRevert { script: label });
            }
            return Err(LoaderError::validation(
                label,
                Rule::MissingRevertUnit,
                "apply unit registered without a revert unit",
            ));
        };

        debug!(%version, script = %label, "registered procedural migration");
        Ok(MigrationScript {
            version,
            name: procedure.name.clone(),
            checksum: procedure_checksum(&version, &procedure.name, &procedure.fingerprint),
            body: ScriptBody::Procedure { apply, revert },
            path: None,
        })
    }
}

impl Iterator for Scripts<'_> {
    type Item = Result<MigrationScript, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let candidate = self.pending.next()?;
        Some(self.load(candidate))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}

/// Read a script file and run the static statement rules on it.
fn read_statements(path: &Path) -> Result<Vec<String>, LoaderError> {
    let label = file_label(path);
    let text = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let split = split_statements(&text);

    if let Some(rest) = &split.trailing {
        return Err(LoaderError::validation(
            label,
            Rule::UnterminatedStatement,
            format!("statement is missing a terminating ';': {}", preview(rest)),
        ));
    }
    if split.statements.is_empty() {
        return Err(LoaderError::validation(label, Rule::EmptyBody, "script contains no statements"));
    }
    if split.empty_statements > 0 {
        return Err(LoaderError::validation(
            label,
            Rule::EmptyStatement,
            format!("{} empty statement(s)", split.empty_statements),
        ));
    }
    if let Some(stmt) = split.statements.iter().find(|s| is_transaction_control(s)) {
        return Err(LoaderError::validation(
            label,
            Rule::TransactionControl,
            format!("transactions are managed by sluice: {}", preview(stmt)),
        ));
    }

    Ok(split.statements)
}

fn preview(stmt: &str) -> String {
    let line = stmt.lines().next().unwrap_or_default();
    if line.chars().count() > 60 {
        format!("{}...", line.chars().take(60).collect::<String>())
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn loader(dir: &Path) -> ScriptLoader {
        ScriptLoader::new(dir, VersionScheme::Integer)
    }

    fn versions(scripts: &[MigrationScript]) -> Vec<String> {
        scripts.iter().map(|s| s.version.to_string()).collect()
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = TempDir::new().unwrap();
        let scripts = loader(&tmp.path().join("nope")).load_all().unwrap();
        assert!(scripts.is_empty());
    }

    #[test]
    fn file_versions_ignores_contents() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "0001_a.up.sql", "");
        write(tmp.path(), "0001_a.down.sql", "");
        write(tmp.path(), "0007_b.up.sql", "-- todo");
        write(tmp.path(), "notes.sql", "SELECT 1;");

        let found = loader(tmp.path()).file_versions().unwrap();
        assert_eq!(found, vec![Version::Integer(1), Version::Integer(7)]);
    }

    #[test]
    fn loads_up_and_down_pairs() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "0001_create_users.up.sql", "CREATE TABLE users (id INTEGER);");
        write(tmp.path(), "0001_create_users.down.sql", "DROP TABLE users;");
        write(tmp.path(), "0002_add_index.up.sql", "CREATE INDEX idx ON users (id);");
        write(tmp.path(), "README.md", "not a migration");

        let scripts = loader(tmp.path()).load_all().unwrap();
        assert_eq!(versions(&scripts), vec!["1", "2"]);
        assert_eq!(scripts[0].name, "create_users");
        assert!(scripts[0].body.is_reversible());
        assert!(!scripts[1].body.is_reversible());
        assert_eq!(scripts[0].checksum.len(), 64);
        assert_eq!(
            scripts[0].path.as_deref(),
            Some(tmp.path().join("0001_create_users.up.sql").as_path())
        );
    }

    #[test]
    fn name_is_optional() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "7.up.sql", "SELECT 1;");

        let scripts = loader(tmp.path()).load_all().unwrap();
        assert_eq!(scripts[0].name, "");
        assert_eq!(scripts[0].label(), "7");
    }

    #[test]
    fn iteration_is_lazy_and_restartable() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        write(tmp.path(), "2_b.up.sql", "SELECT 2;");
        let loader = loader(tmp.path());

        let mut first = loader.scripts().unwrap();
        assert_eq!(first.size_hint(), (2, Some(2)));
        assert!(first.next().unwrap().is_ok());

        // Content is read on demand, so a later break shows up only when reached.
        write(tmp.path(), "2_b.up.sql", "SELECT 2");
        assert_eq!(
            first.next().unwrap().unwrap_err().rule(),
            Some(Rule::UnterminatedStatement)
        );

        write(tmp.path(), "2_b.up.sql", "SELECT 2;");
        let again: Vec<_> = loader.scripts().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        write(tmp.path(), "001_b.up.sql", "SELECT 2;");

        let err = loader(tmp.path()).load_all().unwrap_err();
        match err {
            LoaderError::DuplicateVersion { version, first, second } => {
                assert_eq!(version, Version::Integer(1));
                assert_eq!(first, "001_b.up.sql");
                assert_eq!(second, "1_a.up.sql");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn require_revert_rejects_missing_down() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");

        assert!(loader(tmp.path()).load_all().is_ok());
        let err = loader(tmp.path()).require_revert(true).load_all().unwrap_err();
        assert!(matches!(err, LoaderError::MissingRevert { script } if script == "1_a.up.sql"));
    }

    #[test]
    fn zero_version_is_invalid() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "0_init.up.sql", "SELECT 1;");

        let err = loader(tmp.path()).load_all().unwrap_err();
        assert!(matches!(err, LoaderError::InvalidVersion { .. }));
    }

    #[test]
    fn integer_tag_is_invalid_under_timestamp_scheme() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "12_init.up.sql", "SELECT 1;");

        let err = ScriptLoader::new(tmp.path(), VersionScheme::Timestamp)
            .load_all()
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidVersion { .. }));
    }

    #[test]
    fn same_second_timestamps_collide() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "20240101120000_a.up.sql", "SELECT 1;");
        write(tmp.path(), "20240101120000500_b.up.sql", "SELECT 2;");
        write(tmp.path(), "20240101120001_c.up.sql", "SELECT 3;");

        let loader = ScriptLoader::new(tmp.path(), VersionScheme::Timestamp);
        let results: Vec<_> = loader.scripts().unwrap().collect();
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().unwrap_err().rule(),
            Some(Rule::TimestampCollision)
        );
        assert!(results[2].is_ok());
    }

    #[rstest]
    #[case::empty_body("-- only a comment\n", Rule::EmptyBody)]
    #[case::blank("   \n", Rule::EmptyBody)]
    #[case::unterminated("CREATE TABLE t (id INTEGER)", Rule::UnterminatedStatement)]
    #[case::empty_statement("SELECT 1;;", Rule::EmptyStatement)]
    #[case::begin("BEGIN TRANSACTION;\nCREATE TABLE t (id INTEGER);\nCOMMIT;", Rule::TransactionControl)]
    fn static_rules(#[case] body: &str, #[case] rule: Rule) {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_bad.up.sql", body);

        let err = loader(tmp.path()).load_all().unwrap_err();
        assert_eq!(err.rule(), Some(rule), "unexpected error: {err}");
        assert!(err.to_string().starts_with("1_bad.up.sql: "));
    }

    #[test]
    fn down_scripts_are_checked_too() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        write(tmp.path(), "1_a.down.sql", "");

        let err = loader(tmp.path()).load_all().unwrap_err();
        assert_eq!(err.rule(), Some(Rule::EmptyBody));
        assert!(err.to_string().contains("1_a.down.sql"));
    }

    #[test]
    fn trigger_bodies_are_accepted() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "1_trigger.up.sql",
            "CREATE TABLE t (id INTEGER, n INTEGER);\n\
             CREATE TRIGGER bump AFTER INSERT ON t BEGIN\n  UPDATE t SET n = 1;\nEND;\n",
        );

        let scripts = loader(tmp.path()).load_all().unwrap();
        match &scripts[0].body {
            ScriptBody::Statements { apply, .. } => assert_eq!(apply.len(), 3),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[rstest]
    #[case("1_a.sql")]
    #[case("1-a.up.sql")]
    #[case("abc.up.sql")]
    #[case("1_a.upgrade.sql")]
    fn malformed_filenames(#[case] file: &str) {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), file, "SELECT 1;");

        let err = loader(tmp.path()).load_all().unwrap_err();
        assert_eq!(err.rule(), Some(Rule::FilenameGrammar));
    }

    #[test]
    fn orphan_down_script_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.down.sql", "SELECT 1;");

        let err = loader(tmp.path()).load_all().unwrap_err();
        assert_eq!(err.rule(), Some(Rule::MissingApply));
    }

    #[test]
    fn comment_edits_keep_checksum() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        let before = loader(tmp.path()).load_all().unwrap()[0].checksum.clone();

        write(tmp.path(), "1_a.up.sql", "-- explain\nSELECT 1; -- trailing\n");
        let after = loader(tmp.path()).load_all().unwrap()[0].checksum.clone();
        assert_eq!(before, after);

        write(tmp.path(), "1_a.up.sql", "SELECT 2;");
        let changed = loader(tmp.path()).load_all().unwrap()[0].checksum.clone();
        assert_ne!(before, changed);
    }

    #[test]
    fn procedures_follow_directory_scripts() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        let loader = loader(tmp.path()).with_procedure(
            ProceduralMigration::new("2", "backfill")
                .apply(|_| Ok(()))
                .revert(|_| Ok(()))
                .fingerprint("r1"),
        );

        let scripts = loader.load_all().unwrap();
        assert_eq!(versions(&scripts), vec!["1", "2"]);
        assert!(scripts[1].body.is_procedural());
        assert!(scripts[1].path.is_none());
    }

    #[test]
    fn procedure_without_revert_unit() {
        let tmp = TempDir::new().unwrap();
        let procedure = ProceduralMigration::new("1", "oneway").apply(|_| Ok(()));

        let err = loader(tmp.path())
            .with_procedure(procedure.clone())
            .load_all()
            .unwrap_err();
        assert_eq!(err.rule(), Some(Rule::MissingRevertUnit));

        let err = loader(tmp.path())
            .require_revert(true)
            .with_procedure(procedure)
            .load_all()
            .unwrap_err();
        assert!(matches!(err, LoaderError::MissingRevert { .. }));
    }

    #[test]
    fn procedure_without_apply_unit() {
        let tmp = TempDir::new().unwrap();
        let err = loader(tmp.path())
            .with_procedure(ProceduralMigration::new("1", "empty").revert(|_| Ok(())))
            .load_all()
            .unwrap_err();
        assert_eq!(err.rule(), Some(Rule::MissingApply));
    }

    #[test]
    fn procedure_version_clashes_with_file() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        let err = loader(tmp.path())
            .with_procedure(
                ProceduralMigration::new("1", "dup")
                    .apply(|_| Ok(()))
                    .revert(|_| Ok(())),
            )
            .load_all()
            .unwrap_err();
        assert!(matches!(err, LoaderError::DuplicateVersion { .. }));
    }
}
