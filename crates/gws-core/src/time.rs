//! Time utilities for gws
//!
//! Credential expiry is tracked as a Unix timestamp in seconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Seconds left until `deadline`, or 0 if it has passed.
pub fn secs_until(deadline: u64) -> u64 {
    deadline.saturating_sub(current_time_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_secs_is_positive() {
        assert!(current_time_secs() > 0);
    }

    #[test]
    fn test_secs_until_past_deadline() {
        assert_eq!(secs_until(1), 0);
    }

    #[test]
    fn test_secs_until_future_deadline() {
        let left = secs_until(current_time_secs() + 600);
        assert!(left > 590 && left <= 600);
    }
}
