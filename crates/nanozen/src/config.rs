use nanozen_timing::Duration;
pub use nanozen_transport::TransportMode;

use crate::error::{EngineError, EngineResult};

/// `LATENCY_BUDGET` from §6: `Immediate` flushes the packer on every `write` (the
/// source's `LATENCY_BUDGET == 0`), `Infinite` never flushes by time (only by MTU,
/// destination or conduit change), and `Bounded` arms a deadline after the packet's
/// first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyBudget {
    Immediate,
    Bounded(Duration),
    Infinite,
}

/// Compile-time-in-spirit capacities and timers from §6, resolved once at
/// `Engine::new` rather than via preprocessor macros. Capacities that size fixed
/// arrays (`MAX_PUBS`, `MAX_SUBS`, `MAX_PEERS`, `XMITW_BYTES`, `TRANSPORT_MTU`) are
/// const generics on `Engine` itself, not fields here — Rust has no runtime-sized
/// fixed array, so the array-shaping knobs must be in the type, while the remaining
/// timers and policy knobs are ordinary constructor parameters.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub transport_mode: TransportMode,
    pub latency_budget: LatencyBudget,
    pub msynch_interval: Duration,
    pub scout_interval: Duration,
    pub open_interval: Duration,
    pub open_retries: u8,
    /// Lease we request of a broker in `OPEN` (§4.6); renewed to whatever the
    /// broker actually grants in its `ACCEPT` reply.
    pub lease: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport_mode: TransportMode::Packet,
            latency_budget: LatencyBudget::Bounded(Duration::from_millis(10)),
            msynch_interval: Duration::from_millis(150),
            scout_interval: Duration::from_millis(1_000),
            open_interval: Duration::from_millis(400),
            open_retries: 5,
            lease: Duration::from_millis(10_000),
        }
    }
}

impl EngineConfig {
    /// Per the stream-mode/MAX_PEERS open question in §9: stream-mode peer handling
    /// has no per-peer reassembly buffers in this build, mirroring the `#error` the
    /// distilled-from source raises for that combination rather than silently
    /// misbehaving.
    pub fn validate(&self, max_peers: usize) -> EngineResult<()> {
        if self.transport_mode == TransportMode::Stream && max_peers > 1 {
            return Err(EngineError::UnsupportedConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_mode_rejects_multi_peer() {
        let cfg = EngineConfig { transport_mode: TransportMode::Stream, ..EngineConfig::default() };
        assert!(cfg.validate(1).is_ok());
        assert!(matches!(cfg.validate(2), Err(EngineError::UnsupportedConfig)));
    }

    #[test]
    fn packet_mode_allows_multi_peer() {
        let cfg = EngineConfig { transport_mode: TransportMode::Packet, ..EngineConfig::default() };
        assert!(cfg.validate(8).is_ok());
    }
}
