use crate::{Duration, Instant};

/// Fires at most once per `interval`, driven by an explicitly supplied `now` rather
/// than a hidden global clock — the engine's loop owns time, per the single-threaded,
/// cooperatively-scheduled contract.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Repeater {
    interval: Duration,
    last_acted: Instant,
}

impl Repeater {
    #[inline]
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_acted: Instant::ZERO }
    }

    #[inline]
    pub fn maybe<F>(&mut self, now: Instant, mut f: F)
    where
        F: FnMut(Duration),
    {
        let el = now.saturating_sub(self.last_acted);
        if el >= self.interval {
            f(el);
            self.last_acted = now;
        }
    }

    #[inline]
    pub fn fired(&mut self, now: Instant) -> bool {
        let el = now.saturating_sub(self.last_acted);
        if el >= self.interval {
            self.last_acted = now;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    #[inline]
    pub fn reset(&mut self, now: Instant) {
        self.last_acted = now;
    }

    /// Forces the next `fired`/`maybe` call to trigger regardless of `interval`.
    #[inline]
    pub fn force_fire(&mut self) {
        self.last_acted = Instant::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_interval() {
        let mut r = Repeater::every(Duration::from_millis(100));
        assert!(!r.fired(Instant::from_millis(50)));
        assert!(r.fired(Instant::from_millis(150)));
        assert!(!r.fired(Instant::from_millis(200)));
        assert!(r.fired(Instant::from_millis(250)));
    }

    #[test]
    fn force_fire_triggers_immediately() {
        let mut r = Repeater::every(Duration::from_millis(100));
        r.reset(Instant::from_millis(1_000));
        assert!(!r.fired(Instant::from_millis(1_010)));
        r.force_fire();
        assert!(r.fired(Instant::from_millis(1_010)));
    }
}
