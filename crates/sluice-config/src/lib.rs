pub mod config;
pub mod scheme;
pub mod transaction_mode;

pub use config::{CONFIG_FILE, SluiceConfig, default_migration_filename_pattern};
pub use scheme::VersionScheme;
pub use transaction_mode::TransactionMode;
