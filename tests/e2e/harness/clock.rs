use dazbuild_core::TimeProvider;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Controllable time for session idle tracking.
///
/// Passed to the registry via `with_time_provider()` so scenarios can move
/// time forward without sleeping.
#[derive(Clone)]
pub struct MockClock {
    current: Arc<AtomicI64>,
}

impl MockClock {
    /// Create a new mock clock starting at a fixed instant
    pub fn new() -> Self {
        Self {
            current: Arc::new(AtomicI64::new(1_700_000_000)),
        }
    }

    /// Time provider reading this clock.
    pub fn as_provider(&self) -> TimeProvider {
        let current = self.current.clone();
        Arc::new(move || current.load(Ordering::SeqCst))
    }

    /// Get current timestamp
    pub fn now(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Advance time by duration
    pub fn advance(&self, duration: Duration) {
        let seconds = duration.as_secs() as i64;
        self.current.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}
