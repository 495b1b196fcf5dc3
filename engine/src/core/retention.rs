//! Retention cutoff decisions for the sweeper.

use std::time::{Duration, SystemTime};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// True when an artifact last modified at `modified` has outlived the
/// retention window ending at `now`.
///
/// Clock skew that places `modified` in the future reads as age zero, so a
/// skewed entry is kept rather than deleted.
pub fn is_expired(modified: SystemTime, now: SystemTime, retention_days: u32) -> bool {
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    age > Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_entries_older_than_window() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100 * SECS_PER_DAY);
        let old = now - Duration::from_secs(31 * SECS_PER_DAY);
        let fresh = now - Duration::from_secs(29 * SECS_PER_DAY);
        assert!(is_expired(old, now, 30));
        assert!(!is_expired(fresh, now, 30));
    }

    #[test]
    fn boundary_is_not_expired() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100 * SECS_PER_DAY);
        let exactly = now - Duration::from_secs(30 * SECS_PER_DAY);
        assert!(!is_expired(exactly, now, 30));
    }

    #[test]
    fn future_mtimes_are_kept() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100 * SECS_PER_DAY);
        let future = now + Duration::from_secs(SECS_PER_DAY);
        assert!(!is_expired(future, now, 30));
    }
}
