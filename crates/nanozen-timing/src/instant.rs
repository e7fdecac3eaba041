use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::Duration;

/// A point in monotonic time, in milliseconds, as returned by the clock interface's
/// `now()`. Comparisons between two `Instant`s taken far apart are not meaningful if
/// the underlying millisecond counter has wrapped; `signed_diff` reproduces the
/// original's `(ztimediff_t)(tnow - mark)` idiom for timeout checks that must tolerate
/// that wrap.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Instant(pub u64);

impl Instant {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// `self - other`, interpreted as a signed difference so a wrapped clock still
    /// compares correctly near the wraparound point.
    #[inline]
    pub fn signed_diff(&self, other: Instant) -> i64 {
        self.0.wrapping_sub(other.0) as i64
    }

    /// True iff at least `dur` has elapsed between `other` and `self` (`self` is the
    /// later reading), tolerating wraparound via `signed_diff`.
    #[inline]
    pub fn has_elapsed_since(&self, other: Instant, dur: Duration) -> bool {
        self.signed_diff(other) >= dur.as_millis() as i64
    }

    #[inline]
    pub fn saturating_sub(&self, other: Instant) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }
}

impl PartialOrd for Instant {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Instant {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sub for Instant {
    type Output = Duration;
    #[inline]
    fn sub(self, rhs: Instant) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;
    #[inline]
    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;
    #[inline]
    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_sub(rhs.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_diff_tolerates_wrap() {
        let early = Instant(u64::MAX);
        let late = Instant(5);
        // 5 wraps back to `u64::MAX + 6`, i.e. 6 ms after `early`.
        assert_eq!(late.signed_diff(early), 6);
    }

    #[test]
    fn has_elapsed_since() {
        let mark = Instant::from_millis(1_000);
        assert!(!Instant::from_millis(1_050).has_elapsed_since(mark, Duration::from_millis(100)));
        assert!(Instant::from_millis(1_100).has_elapsed_since(mark, Duration::from_millis(100)));
    }

    #[test]
    fn add_sub_duration() {
        let t = Instant::from_millis(100) + Duration::from_millis(50);
        assert_eq!(t, Instant::from_millis(150));
        assert_eq!(t - Duration::from_millis(50), Instant::from_millis(100));
    }
}
