//! Unix timestamps for pending challenges.
//!
//! A [`PendingChallenge`](crate::correlator::PendingChallenge) records when it
//! was started so that a restored challenge can report its age.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Whole seconds since the Unix epoch, persisted as a bare JSON integer.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Current system time. A clock set before the epoch reads as zero.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self(now)
    }

    /// Seconds elapsed between `self` and `later`, saturating at zero.
    #[must_use]
    pub const fn seconds_until(&self, later: Self) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persisted_as_integer() {
        let ts = UnixTimestamp(1_699_999_999);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1699999999");
        let back: UnixTimestamp = serde_json::from_str("1699999999").unwrap();
        assert_eq!(back, ts);
        assert!(serde_json::from_str::<UnixTimestamp>("-1").is_err());
    }

    #[test]
    fn test_seconds_until_saturates() {
        let start = UnixTimestamp(100);
        assert_eq!(start.seconds_until(UnixTimestamp(160)), 60);
        assert_eq!(start.seconds_until(UnixTimestamp(10)), 0);
    }
}
