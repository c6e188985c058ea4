use std::path::PathBuf;
use std::thread;

use anyhow::{Result, bail};
use clap::Args;
use colored::Colorize;
use sluice::{Cancellation, Direction, Migrator, StepReport, Target, Version};
use sluice_config::{CONFIG_FILE, SluiceConfig};
use sluice_loader::load_config_from_path;
use tracing::warn;

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Path to the project config file.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,
    /// Database file, overriding the config.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    /// Migrations directory, overriding the config.
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,
}

impl Default for ProjectArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(CONFIG_FILE),
            database: None,
            migrations_dir: None,
        }
    }
}

impl ProjectArgs {
    /// Load the config file and apply command-line overrides.
    pub fn load(&self) -> Result<SluiceConfig> {
        let mut config = load_config_from_path(self.config.clone())?;
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut SluiceConfig) {
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(dir) = &self.migrations_dir {
            config.migrations_dir = dir.clone();
        }
    }

    pub fn open(&self) -> Result<Migrator> {
        Ok(Migrator::open(self.load()?)?)
    }
}

/// Build the `<version>[_<name>]` stem of a new script pair from the filename pattern.
pub fn migration_stem(version: &Version, message: Option<&str>, pattern: &str) -> Result<String> {
    let tag = version.to_string();
    let sanitized = sanitize_comment(message);
    let stem = render_migration_name(pattern, &tag, &sanitized);

    let digits_end = stem.find(|c: char| !c.is_ascii_digit()).unwrap_or(stem.len());
    let (digits, rest) = stem.split_at(digits_end);
    let name_ok = rest.is_empty()
        || rest.strip_prefix('_').is_some_and(|name| {
            !name.is_empty()
                && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        });
    let tag_ok = Version::parse(digits, version.scheme()).is_ok_and(|v| v == *version);
    if !(name_ok && tag_ok) {
        bail!("filename pattern '{pattern}' produced '{stem}', which is not <version>_<name>");
    }
    Ok(stem)
}

fn sanitize_comment(comment: Option<&str>) -> String {
    comment
        .map(|c| {
            c.to_lowercase()
                .chars()
                .map(|ch| if ch.is_ascii_alphanumeric() || ch == ' ' { ch } else { '_' })
                .collect::<String>()
                .split(|ch: char| ch == ' ' || ch == '_')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("_")
        })
        .unwrap_or_default()
}

/// Expand `%v`, `%0Nv` (zero-padded to N) and `%m` in `pattern`.
fn render_migration_name(pattern: &str, tag: &str, sanitized_comment: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    let mut out = String::new();

    while i < chars.len() {
        if chars[i] == '%' && i + 1 < chars.len() {
            match chars[i + 1] {
                'v' => {
                    out.push_str(tag);
                    i += 2;
                    continue;
                }
                'm' => {
                    out.push_str(sanitized_comment);
                    i += 2;
                    continue;
                }
                '0' => {
                    let mut j = i + 2;
                    let mut width = String::new();
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        width.push(chars[j]);
                        j += 1;
                    }
                    if j < chars.len() && chars[j] == 'v' {
                        let w: usize = width.parse().unwrap_or(0);
                        out.push_str(&format!("{tag:0>w$}"));
                        i = j + 1;
                        continue;
                    }
                }
                _ => {}
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    // Trim redundant trailing separators when the message is empty.
    while out.ends_with('_') || out.ends_with('-') || out.ends_with('.') {
        out.pop();
    }

    if out.is_empty() { tag.to_string() } else { out }
}

/// Flip `cancel` on the first Ctrl-C; a second one exits immediately.
pub fn cancel_on_ctrl_c(cancel: Cancellation) {
    let spawned = thread::Builder::new()
        .name("sluice-ctrl-c".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "could not start signal listener");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("{}", "Interrupted: stopping after the current migration...".yellow());
                    cancel.cancel();
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not install Ctrl-C handler");
    }
}

fn step_label(version: &Version, name: &str) -> String {
    if name.is_empty() {
        version.to_string()
    } else {
        format!("{version}_{name}")
    }
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Apply => "apply",
        Direction::Revert => "revert",
    }
}

fn done_verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Apply => "applied",
        Direction::Revert => "reverted",
    }
}

fn print_progress(report: &StepReport) {
    println!(
        "  [{}/{}] {} {} {}",
        report.index + 1,
        report.total,
        done_verb(report.direction).bright_green(),
        step_label(&report.version, &report.name).bright_white(),
        format!("({} ms)", report.elapsed.as_millis()).dimmed()
    );
}

/// Plan `target` and either print the plan or run it with progress output.
///
/// The run re-plans once the lock is held, so the printed steps are the
/// ones that actually committed.
pub fn execute(migrator: &mut Migrator, target: Target, dry_run: bool) -> Result<()> {
    let plan = migrator.plan(&target)?;
    if plan.is_empty() {
        println!("{}", "Nothing to do. Database is at the requested version.".bright_green());
        return Ok(());
    }

    if dry_run {
        println!(
            "{} {}",
            "Planned steps:".bright_cyan().bold(),
            plan.len().to_string().bright_yellow()
        );
        for step in plan.steps() {
            println!(
                "  {} {}",
                verb(step.direction).cyan(),
                step.script.label().bright_white()
            );
        }
        return Ok(());
    }

    let cancel = Cancellation::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut last_direction = None;
    let outcome = migrator.migrate_with(&target, &cancel, |report| {
        last_direction = Some(report.direction);
        print_progress(report);
    });
    match outcome {
        Ok(report) if report.completed.is_empty() => {
            println!("{}", "Nothing to do. Another run already reached the requested version.".bright_green());
            Ok(())
        }
        Ok(report) => {
            println!(
                "{} {} migration(s) {}",
                "Done:".bright_green().bold(),
                report.completed.len(),
                last_direction.map(done_verb).unwrap_or("run")
            );
            Ok(())
        }
        Err(err) => {
            if let sluice::Error::Executor(e) = &err {
                let completed = e.completed();
                if !completed.is_empty() {
                    let list: Vec<String> = completed.iter().map(Version::to_string).collect();
                    eprintln!("{} {}", "Committed before stopping:".yellow(), list.join(", "));
                }
            }
            Err(err.into())
        }
    }
}

/// Parse an optional version argument under the project's scheme.
pub fn parse_target(migrator: &Migrator, tag: Option<&str>) -> Result<Option<Version>> {
    tag.map(|t| migrator.parse_version(t)).transpose().map_err(Into::into)
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_pattern("%04v_%m", 3, Some("Create users"), "0003_create_users")]
    #[case::no_padding("%v_%m", 12, Some("add-index!"), "12_add_index")]
    #[case::wide_padding("%06v_%m", 7, Some("x"), "000007_x")]
    #[case::empty_message("%04v_%m", 5, None, "0005")]
    #[case::literal_text("%04v_%m_seed", 2, Some("roles"), "0002_roles_seed")]
    fn stem_from_pattern(
        #[case] pattern: &str,
        #[case] version: u64,
        #[case] message: Option<&str>,
        #[case] expected: &str,
    ) {
        let stem = migration_stem(&Version::Integer(version), message, pattern).unwrap();
        assert_eq!(stem, expected);
    }

    #[test]
    fn timestamp_tag_is_not_padded() {
        let version = Version::parse("20240506070809", sluice::VersionScheme::Timestamp).unwrap();
        let stem = migration_stem(&version, Some("init"), "%04v_%m").unwrap();
        assert_eq!(stem, "20240506070809_init");
    }

    #[rstest]
    #[case::message_first("%m_%v")]
    #[case::no_version("%m")]
    #[case::dot_separator("%v.%m")]
    fn pattern_breaking_filename_grammar_is_rejected(#[case] pattern: &str) {
        let err = migration_stem(&Version::Integer(1), Some("users"), pattern).unwrap_err();
        assert!(err.to_string().contains("not <version>_<name>"));
    }

    #[test]
    fn overrides_replace_config_paths() {
        let args = ProjectArgs {
            database: Some(PathBuf::from("other.db")),
            migrations_dir: Some(PathBuf::from("sql")),
            ..Default::default()
        };
        let mut config = SluiceConfig::default();
        args.apply(&mut config);
        assert_eq!(config.database, PathBuf::from("other.db"));
        assert_eq!(config.migrations_dir, PathBuf::from("sql"));
    }
}
