use std::time::{SystemTime, UNIX_EPOCH};

use crate::TimeSource;

/// The operating system's wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    /// Returns Unix milliseconds, or `0` if the system clock is set before
    /// 1970.
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_epoch_start() {
        let now = SystemClock.current_millis();
        assert!(now > crate::EPOCH_START_MS);
        assert!(SystemClock.current_seconds() >= now / 1_000);
    }
}
