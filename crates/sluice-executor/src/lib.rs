pub mod cancel;
pub mod error;
pub mod executor;

pub use cancel::Cancellation;
pub use error::{ExecutorError, StepError};
pub use executor::{Executor, ExecutorOptions, RunReport, RunState, StepReport};
