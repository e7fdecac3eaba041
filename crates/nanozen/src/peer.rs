//! Per-peer state (§3 "Peer"): session lifecycle, lease tracking, one
//! outgoing conduit and two incoming conduits (reliable and unreliable) per
//! configured conduit index. `N_CONDUITS` is fixed at 1 in this build
//! (conduit 0, unicast) — see `Engine`'s module docs for why the
//! multi-conduit arrays stop at the type boundary instead of being wired all
//! the way through.

use nanozen_timing::{Duration, Instant};
use nanozen_utils::ArrayStr;

use crate::conduit::{IncomingConduit, OutgoingConduit};
use crate::declare::DeclareTransaction;
use crate::seqnum::SeqNum;

pub const PEERID_SIZE: usize = 16;
pub const MAX_RSUBS_PER_PEER: usize = 16;

/// Per-peer state. Session lifecycle lives in the matching `SessionDriver`
/// slot on `Engine`, not here — a `Peer` is the data a session accumulates,
/// not the session itself.
pub struct Peer<Addr, const XMITW_BYTES: usize> {
    pub addr: Addr,
    pub peer_id: ArrayStr<PEERID_SIZE>,
    lease: Duration,
    pub lease_deadline: Instant,
    pub oc: OutgoingConduit<XMITW_BYTES>,
    /// Reliable conduit: in-order delivery, gaps held back for retransmit.
    pub ic_reliable: IncomingConduit,
    /// Unreliable conduit: best-effort, no gap tracking.
    pub ic_unreliable: IncomingConduit,
    /// This side's own next sequence number for unreliable `SDATA` sent to
    /// this peer — unreliable samples still carry a real sequence number so
    /// the receiving `IncomingConduit::admit` can drop stale duplicates.
    unreliable_seq: SeqNum,
    pub declares: DeclareTransaction<MAX_RSUBS_PER_PEER>,
}

impl<Addr, const XMITW_BYTES: usize> Peer<Addr, XMITW_BYTES> {
    pub fn new(
        addr: Addr,
        peer_id: ArrayStr<PEERID_SIZE>,
        now: Instant,
        lease: Duration,
        msynch_interval: Duration,
    ) -> Self {
        Self {
            addr,
            peer_id,
            lease,
            lease_deadline: now + lease,
            oc: OutgoingConduit::new(now, msynch_interval),
            ic_reliable: IncomingConduit::new(true),
            ic_unreliable: IncomingConduit::new(false),
            unreliable_seq: SeqNum::ZERO,
            declares: DeclareTransaction::new(),
        }
    }

    pub fn lease_expired(&self, now: Instant) -> bool {
        now.has_elapsed_since(self.lease_deadline, Duration::ZERO)
    }

    /// Sets the lease duration this peer's deadline renews to — the value
    /// ultimately granted in `ACCEPT`, which may differ from what `OPEN`
    /// requested (§4.6).
    pub fn set_lease(&mut self, lease: Duration) {
        self.lease = lease;
    }

    /// Pushes the lease deadline `now + lease` out, using whatever lease is
    /// currently in force for this peer.
    pub fn renew_lease(&mut self, now: Instant) {
        self.lease_deadline = now + self.lease;
    }

    pub fn next_unreliable_seq(&mut self) -> SeqNum {
        let seq = self.unreliable_seq;
        self.unreliable_seq = seq.next();
        seq
    }
}
