pub mod config;
pub mod error;
pub mod procedure;
pub mod scripts;

pub use config::load_config_from_path;
pub use error::{LoaderError, Rule};
pub use procedure::ProceduralMigration;
pub use scripts::{ScriptLoader, Scripts};
