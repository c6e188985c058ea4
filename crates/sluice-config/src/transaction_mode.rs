use serde::{Deserialize, Serialize};

/// Transaction boundary used by the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub enum TransactionMode {
    /// One transaction per migration; earlier steps stay committed when a later one fails.
    #[default]
    PerMigration,
    /// A single transaction around the whole plan.
    WholePlan,
}

impl TransactionMode {
    pub fn is_per_migration(self) -> bool {
        matches!(self, TransactionMode::PerMigration)
    }

    pub fn is_whole_plan(self) -> bool {
        matches!(self, TransactionMode::WholePlan)
    }
}

#[cfg(test)]
mod tests {
    use super::TransactionMode;

    #[test]
    fn default_is_per_migration() {
        assert_eq!(TransactionMode::default(), TransactionMode::PerMigration);
    }

    #[test]
    fn serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&TransactionMode::WholePlan).unwrap(),
            "\"wholePlan\""
        );
        assert_eq!(
            serde_json::from_str::<TransactionMode>("\"perMigration\"").unwrap(),
            TransactionMode::PerMigration
        );
    }
}
