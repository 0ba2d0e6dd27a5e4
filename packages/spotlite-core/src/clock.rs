//! Wall-clock abstraction.
//!
//! The refresh scheduler, the position ticker, and the recently-played
//! suppression window all need "now". Reading the system clock directly in
//! those code paths would make them untestable without real delays, so they
//! depend on this trait instead and bootstrap injects [`SystemClock`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    /// Returns the current Unix timestamp in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Clock backed by the real system time.
pub struct SystemClock;

impl Clock for SystemClock {
    /// Returns 0 if the system clock is before the Unix epoch (shouldn't
    /// happen in practice).
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
