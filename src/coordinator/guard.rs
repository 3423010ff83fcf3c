//! Single-flight submission guard

use std::sync::atomic::{AtomicBool, Ordering};

/// At most one submission per form is in flight. A second attempt while the
/// guard is engaged is refused, not queued.
#[derive(Debug, Default)]
pub struct SubmissionGuard {
    engaged: AtomicBool,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// Engage the guard. Returns `None` if it is already engaged. The guard
    /// is released when the returned token drops.
    pub fn try_engage(&self) -> Option<GuardToken<'_>> {
        self.engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardToken { guard: self })
    }
}

#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a SubmissionGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.engaged.store(false, Ordering::Release);
    }
}
