//! Process-wide test hooks.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// A named, process-wide boolean toggled by tests to force a code path.
///
/// `enable`/`disable` use compare-and-set so a test can tell whether it was
/// the one that flipped the state.
#[derive(Debug)]
pub struct FailPoint {
    name: &'static str,
    enabled: AtomicBool,
}

impl FailPoint {
    pub const fn new(name: &'static str) -> Self {
        FailPoint {
            name,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `false` if the failpoint was already enabled.
    pub fn enable(&self) -> bool {
        self.enabled.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    /// Returns `false` if the failpoint was already disabled.
    pub fn disable(&self) -> bool {
        self.enabled.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    pub fn should_fail(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// While enabled, the fetcher behaves as if the cursor returned an empty
/// batch, deterministically pausing production of operations.
pub static STOP_REPL_PRODUCER: FailPoint = FailPoint::new("stopReplProducer");
