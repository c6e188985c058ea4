use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag asking an executor run to stop before its next step.
///
/// A step that already started is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
