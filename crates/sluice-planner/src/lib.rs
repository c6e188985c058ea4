pub mod error;
pub mod plan;
pub mod status;

pub use error::PlannerError;
pub use plan::{Planner, RevertTarget};
pub use status::Status;
