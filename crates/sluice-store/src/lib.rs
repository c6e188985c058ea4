pub mod error;
pub mod lock;
pub mod store;

pub use error::StoreError;
pub use lock::{LockHolder, LockToken};
pub use store::StateStore;
