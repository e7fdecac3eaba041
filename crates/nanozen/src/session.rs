//! Per-peer session state machine (§4.6), grounded in the distilled-from
//! source's `zeno_loop`/`zeno_init` state switch. The source threads
//! `OPENING(n)` through a byte range reused as both a tag and a retry
//! counter; a tagged enum carrying the counter explicitly says the same thing
//! without the caller having to know the encoding.

use nanozen_timing::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    WaitInput,
    DrainInput,
    Scout,
    ScoutSent,
    Opening(u8),
    Connected,
    Operational,
}

impl SessionState {
    pub fn is_established(&self) -> bool {
        matches!(self, Self::Connected | Self::Operational)
    }
}

/// Drives one peer's session forward a tick, given whether input (any bytes)
/// arrived since the last tick. This mirrors `zeno_loop`'s big switch without
/// reproducing its control flow literally: each state here owns only the
/// transition decision for that state, and the engine's packet handling
/// supplies the actual SCOUT/OPEN/ACCEPT message effects.
pub struct SessionDriver {
    pub state: SessionState,
    open_retries: u8,
    scout_interval: Duration,
    open_interval: Duration,
    last_action: Instant,
}

impl SessionDriver {
    pub fn new(open_retries: u8, scout_interval: Duration, open_interval: Duration, now: Instant) -> Self {
        Self { state: SessionState::WaitInput, open_retries, scout_interval, open_interval, last_action: now }
    }

    pub fn on_input_received(&mut self) {
        if self.state == SessionState::WaitInput {
            self.state = SessionState::DrainInput;
        }
    }

    /// Starts a session directly in `Scout`, skipping `WaitInput`/`DrainInput`
    /// — this engine only ever plays the client/initiator role, so there is
    /// no inbound byte stream to drain before the first `SCOUT` goes out.
    pub fn start_scouting(&mut self, now: Instant) {
        self.state = SessionState::Scout;
        self.last_action = now;
    }

    pub fn on_drained(&mut self, now: Instant) {
        if self.state == SessionState::DrainInput {
            self.state = SessionState::Scout;
            self.last_action = now;
        }
    }

    pub fn on_hello_received(&mut self, now: Instant) {
        if matches!(self.state, SessionState::Scout | SessionState::ScoutSent) {
            self.state = SessionState::Opening(0);
            self.last_action = now;
        }
    }

    pub fn on_accept_received(&mut self, now: Instant) {
        if matches!(self.state, SessionState::Opening(_)) {
            self.state = SessionState::Connected;
            self.last_action = now;
        }
    }

    pub fn on_first_declare_exchanged(&mut self) {
        if self.state == SessionState::Connected {
            self.state = SessionState::Operational;
        }
    }

    pub fn on_close_received(&mut self) {
        self.state = SessionState::WaitInput;
    }

    /// A lease timed out with no renewal: treat the peer as gone and fall
    /// back to `WaitInput`, the same terminal reset `CLOSE` produces.
    pub fn on_lease_expired(&mut self) {
        self.state = SessionState::WaitInput;
    }

    /// Advances timer-driven transitions: SCOUT resend, OPEN retry-with-
    /// backoff-or-give-up. Returns `true` if the driver wants the engine to
    /// (re)send its state's outbound message this tick.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.state {
            SessionState::Scout => {
                self.state = SessionState::ScoutSent;
                self.last_action = now;
                true
            }
            SessionState::ScoutSent if now.has_elapsed_since(self.last_action, self.scout_interval) => {
                self.last_action = now;
                true
            }
            SessionState::Opening(n) if now.has_elapsed_since(self.last_action, self.open_interval) => {
                if n + 1 >= self.open_retries {
                    self.state = SessionState::WaitInput;
                    false
                } else {
                    self.state = SessionState::Opening(n + 1);
                    self.last_action = now;
                    true
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_reaches_operational() {
        let mut d = SessionDriver::new(3, Duration::from_millis(100), Duration::from_millis(100), Instant::ZERO);
        d.on_input_received();
        assert_eq!(d.state, SessionState::DrainInput);
        d.on_drained(Instant::ZERO);
        assert_eq!(d.state, SessionState::Scout);
        d.tick(Instant::ZERO);
        assert_eq!(d.state, SessionState::ScoutSent);
        d.on_hello_received(Instant::ZERO);
        assert_eq!(d.state, SessionState::Opening(0));
        d.on_accept_received(Instant::ZERO);
        assert_eq!(d.state, SessionState::Connected);
        d.on_first_declare_exchanged();
        assert_eq!(d.state, SessionState::Operational);
        assert!(d.state.is_established());
    }

    #[test]
    fn open_retries_exhaust_back_to_wait_input() {
        let mut d = SessionDriver::new(2, Duration::from_millis(10), Duration::from_millis(10), Instant::ZERO);
        d.state = SessionState::Opening(0);
        assert!(d.tick(Instant::from_millis(10)));
        assert_eq!(d.state, SessionState::Opening(1));
        assert!(!d.tick(Instant::from_millis(20)));
        assert_eq!(d.state, SessionState::WaitInput);
    }

    #[test]
    fn close_resets_to_wait_input_from_any_state() {
        let mut d = SessionDriver::new(3, Duration::from_millis(10), Duration::from_millis(10), Instant::ZERO);
        d.state = SessionState::Operational;
        d.on_close_received();
        assert_eq!(d.state, SessionState::WaitInput);
    }

    #[test]
    fn start_scouting_skips_drain_input() {
        let mut d = SessionDriver::new(3, Duration::from_millis(10), Duration::from_millis(10), Instant::ZERO);
        d.start_scouting(Instant::ZERO);
        assert_eq!(d.state, SessionState::Scout);
    }

    #[test]
    fn lease_expiry_resets_an_operational_session() {
        let mut d = SessionDriver::new(3, Duration::from_millis(10), Duration::from_millis(10), Instant::ZERO);
        d.state = SessionState::Operational;
        d.on_lease_expired();
        assert_eq!(d.state, SessionState::WaitInput);
    }
}
