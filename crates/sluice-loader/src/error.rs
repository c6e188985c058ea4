use std::fmt;
use std::path::PathBuf;

use sluice_core::{Version, VersionError};
use thiserror::Error;

/// Static authoring rule a script can break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    EmptyBody,
    EmptyStatement,
    UnterminatedStatement,
    TransactionControl,
    MissingApply,
    MissingRevertUnit,
    FilenameGrammar,
    TimestampCollision,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::EmptyBody => "empty-body",
            Rule::EmptyStatement => "empty-statement",
            Rule::UnterminatedStatement => "unterminated-statement",
            Rule::TransactionControl => "transaction-control",
            Rule::MissingApply => "missing-apply",
            Rule::MissingRevertUnit => "missing-revert-unit",
            Rule::FilenameGrammar => "filename-grammar",
            Rule::TimestampCollision => "timestamp-collision",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("{script}: invalid version: {source}")]
    InvalidVersion {
        script: String,
        #[source]
        source: VersionError,
    },
    #[error("duplicate version {version}: {first} and {second}")]
    DuplicateVersion {
        version: Version,
        first: String,
        second: String,
    },
    #[error("{script}: revert script is required but missing")]
    MissingRevert { script: String },
    #[error("{script}: [{rule}] {detail}")]
    ScriptValidation {
        script: String,
        rule: Rule,
        detail: String,
    },
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoaderError {
    pub(crate) fn validation(script: impl Into<String>, rule: Rule, detail: impl Into<String>) -> Self {
        LoaderError::ScriptValidation {
            script: script.into(),
            rule,
            detail: detail.into(),
        }
    }

    /// Rule broken, for [`LoaderError::ScriptValidation`].
    pub fn rule(&self) -> Option<Rule> {
        match self {
            LoaderError::ScriptValidation { rule, .. } => Some(*rule),
            _ => None,
        }
    }
}
