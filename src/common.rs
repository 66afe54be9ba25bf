//! Common utilities shared across programs

use std::time::Instant;

/// Monotonic device clock measured from sampler start-up
pub struct TimeKeeper {
    start: Instant,
}

impl TimeKeeper {
    /// Create a new TimeKeeper starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since start, wrapping at 32 bits like a device tick counter
    pub fn now_ms(&self) -> u32 {
        (self.start.elapsed().as_millis() & u128::from(u32::MAX)) as u32
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timekeeper() {
        let keeper = TimeKeeper::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = keeper.elapsed_secs();
        assert!(elapsed >= 0.01); // At least 10ms
        assert!(elapsed < 0.5);
    }

    #[test]
    fn test_now_ms_is_monotonic() {
        let keeper = TimeKeeper::new();
        let first = keeper.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = keeper.now_ms();
        assert!(second >= first + 5);
    }
}
