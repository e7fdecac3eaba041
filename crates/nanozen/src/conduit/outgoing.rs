//! Per-conduit reliable transmit window (OC), §4.2. Samples are appended to a
//! fixed byte ring as `[rid: u32 LE][len: u16 LE][payload]` frames so
//! retransmission can rebuild an exact `SDATA` header without re-copying
//! through the publish path. `seqbase` is the sequence number of the oldest
//! sample still in the window; everything before it has been acknowledged and
//! evicted.

use nanozen_timing::{Duration, Instant};

use crate::error::{EngineError, EngineResult};
use crate::heap::MinSeqHeap;
use crate::registry::ResId;
use crate::seqnum::{seq_le, seq_lt, SeqNum};

const RID_PREFIX: usize = 4;
const LEN_PREFIX: usize = 2;
const FRAME_PREFIX: usize = RID_PREFIX + LEN_PREFIX;

pub struct OutgoingConduit<const BYTES: usize> {
    ring: [u8; BYTES],
    head: usize,
    tail: usize,
    len: usize,
    /// Sequence number of the first sample still resident in the ring.
    seqbase: SeqNum,
    /// Sequence number the next pushed sample will receive.
    seq: SeqNum,
    nsamples: u32,
    /// Next instant a `SYNCH` should go out for this conduit, per §4.6's
    /// "periodically resend SYNCH while samples are outstanding" rule.
    tsynch: Instant,
    msynch_interval: Duration,
}

impl<const BYTES: usize> OutgoingConduit<BYTES> {
    pub fn new(now: Instant, msynch_interval: Duration) -> Self {
        Self {
            ring: [0u8; BYTES],
            head: 0,
            tail: 0,
            len: 0,
            seqbase: SeqNum::ZERO,
            seq: SeqNum::ZERO,
            nsamples: 0,
            tsynch: now + msynch_interval,
            msynch_interval,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nsamples == 0
    }

    pub fn bytes_used(&self) -> usize {
        self.len
    }

    pub fn next_seq(&self) -> SeqNum {
        self.seq
    }

    pub fn seqbase(&self) -> SeqNum {
        self.seqbase
    }

    /// True once `now` has reached the scheduled `SYNCH` instant and there is
    /// at least one unacknowledged sample worth announcing.
    pub fn needs_synch(&self, now: Instant) -> bool {
        self.nsamples > 0 && now.has_elapsed_since(self.tsynch, Duration::ZERO)
    }

    pub fn reschedule_synch(&mut self, now: Instant) {
        self.tsynch = now + self.msynch_interval;
    }

    /// Appends `payload` as the next reliable sample for `rid`, returning its
    /// assigned sequence number. Fails closed rather than silently
    /// overwriting unacknowledged data when the ring has no room. Arms the
    /// `SYNCH` timer on the transition from empty to non-empty, mirroring
    /// `send_msynch`'s "only schedule while there's something to announce".
    pub fn push(&mut self, rid: ResId, payload: &[u8], now: Instant) -> EngineResult<SeqNum> {
        let needed = FRAME_PREFIX + payload.len();
        if self.len + needed > BYTES {
            return Err(EngineError::WindowFull);
        }
        let was_empty = self.is_empty();
        let assigned = self.seq;
        self.write_bytes(&rid.get().to_le_bytes());
        self.write_bytes(&(payload.len() as u16).to_le_bytes());
        self.write_bytes(payload);
        self.nsamples += 1;
        self.seq = self.seq.next();
        if was_empty {
            self.tsynch = now + self.msynch_interval;
        }
        Ok(assigned)
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.ring[self.tail] = b;
            self.tail = (self.tail + 1) % BYTES;
            self.len += 1;
        }
    }

    fn read_at(&self, mut pos: usize, out: &mut [u8]) {
        for slot in out.iter_mut() {
            *slot = self.ring[pos];
            pos = (pos + 1) % BYTES;
        }
    }

    /// Evicts every sample with sequence number `< upto`, per an `ACKNACK`
    /// whose base has advanced (§4.3). No-op if `upto` is not ahead of the
    /// current `seqbase`.
    pub fn evict_acked(&mut self, upto: SeqNum) {
        while self.nsamples > 0 && seq_lt(self.seqbase, upto) {
            let mut len_buf = [0u8; LEN_PREFIX];
            self.read_at((self.head + RID_PREFIX) % BYTES, &mut len_buf);
            let sample_len = u16::from_le_bytes(len_buf) as usize;
            let consumed = FRAME_PREFIX + sample_len;
            self.head = (self.head + consumed) % BYTES;
            self.len -= consumed;
            self.nsamples -= 1;
            self.seqbase = self.seqbase.next();
        }
    }

    /// Copies the sample at `seq` into `out`, for selective retransmission
    /// driven by an `ACKNACK` gap mask. Returns the sample's resource id and
    /// length, or `None` if `seq` has already been evicted or was never
    /// sent.
    pub fn copy_sample(&self, seq: SeqNum, out: &mut [u8]) -> Option<(ResId, usize)> {
        if seq_lt(seq, self.seqbase) || seq_le(self.seq, seq) {
            return None;
        }
        let mut pos = self.head;
        let mut cursor = self.seqbase;
        loop {
            let mut rid_buf = [0u8; RID_PREFIX];
            self.read_at(pos, &mut rid_buf);
            let mut len_buf = [0u8; LEN_PREFIX];
            self.read_at((pos + RID_PREFIX) % BYTES, &mut len_buf);
            let sample_len = u16::from_le_bytes(len_buf) as usize;
            let body_pos = (pos + FRAME_PREFIX) % BYTES;
            if cursor == seq {
                if sample_len > out.len() {
                    return None;
                }
                self.read_at(body_pos, &mut out[..sample_len]);
                let rid = ResId::new(u32::from_le_bytes(rid_buf))?;
                return Some((rid, sample_len));
            }
            pos = (body_pos + sample_len) % BYTES;
            cursor = cursor.next();
        }
    }
}

/// Multicast outgoing conduit (MOC): an [`OutgoingConduit`] whose eviction is
/// gated on the slowest subscribed peer's ACK watermark rather than a single
/// peer's, via the min-sequence heap (§3 "Multicast outgoing conduit").
pub struct MulticastOutgoingConduit<const BYTES: usize, const MAX_PEERS: usize> {
    pub oc: OutgoingConduit<BYTES>,
    watermarks: MinSeqHeap<MAX_PEERS>,
}

impl<const BYTES: usize, const MAX_PEERS: usize> MulticastOutgoingConduit<BYTES, MAX_PEERS> {
    pub fn new(now: Instant, msynch_interval: Duration) -> Self {
        Self { oc: OutgoingConduit::new(now, msynch_interval), watermarks: MinSeqHeap::new() }
    }

    pub fn track_peer(&mut self, peer: u8) {
        self.watermarks.insert(peer, SeqNum::ZERO);
    }

    pub fn drop_peer(&mut self, peer: u8) {
        self.watermarks.remove(peer);
    }

    pub fn ack(&mut self, peer: u8, upto: SeqNum) {
        self.watermarks.update(peer, upto);
        if let Some(min) = self.watermarks.min() {
            self.oc.evict_acked(min);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(n: u32) -> ResId {
        ResId::new(n).unwrap()
    }

    #[test]
    fn push_then_evict_reclaims_ring_space() {
        let mut oc: OutgoingConduit<64> = OutgoingConduit::new(Instant::ZERO, Duration::from_millis(100));
        let s0 = oc.push(rid(1), b"hello", Instant::ZERO).unwrap();
        let s1 = oc.push(rid(1), b"world!", Instant::ZERO).unwrap();
        assert_eq!(s1, s0.next());

        oc.evict_acked(s1);
        assert_eq!(oc.copy_sample(s0, &mut [0u8; 16]), None);

        let mut out = [0u8; 16];
        let (got_rid, n) = oc.copy_sample(s1, &mut out).unwrap();
        assert_eq!(got_rid, rid(1));
        assert_eq!(&out[..n], b"world!");
    }

    #[test]
    fn window_full_fails_closed() {
        let mut oc: OutgoingConduit<8> = OutgoingConduit::new(Instant::ZERO, Duration::from_millis(100));
        oc.push(rid(1), b"1", Instant::ZERO).unwrap();
        assert!(oc.push(rid(1), b"abcdefgh", Instant::ZERO).is_err());
    }

    #[test]
    fn copy_sample_wraps_the_ring_correctly_and_preserves_rid() {
        let mut oc: OutgoingConduit<24> = OutgoingConduit::new(Instant::ZERO, Duration::from_millis(100));
        let a = oc.push(rid(1), b"1234", Instant::ZERO).unwrap();
        oc.evict_acked(a.next());
        let b = oc.push(rid(2), b"5678", Instant::ZERO).unwrap();
        let c = oc.push(rid(3), b"90ab", Instant::ZERO).unwrap();

        let mut out = [0u8; 8];
        let (rb, n) = oc.copy_sample(b, &mut out).unwrap();
        assert_eq!(rb, rid(2));
        assert_eq!(&out[..n], b"5678");
        let (rc, n) = oc.copy_sample(c, &mut out).unwrap();
        assert_eq!(rc, rid(3));
        assert_eq!(&out[..n], b"90ab");
    }

    #[test]
    fn synch_is_scheduled_on_the_first_push_and_fires_once_elapsed() {
        let interval = Duration::from_millis(100);
        let mut oc: OutgoingConduit<64> = OutgoingConduit::new(Instant::ZERO, interval);
        assert!(!oc.needs_synch(Instant::ZERO));

        oc.push(rid(1), b"x", Instant::ZERO).unwrap();
        assert!(!oc.needs_synch(Instant::from_millis(50)));
        assert!(oc.needs_synch(Instant::from_millis(100)));

        oc.reschedule_synch(Instant::from_millis(100));
        assert!(!oc.needs_synch(Instant::from_millis(150)));
        assert!(oc.needs_synch(Instant::from_millis(200)));
    }

    #[test]
    fn empty_conduit_never_needs_a_synch() {
        let oc: OutgoingConduit<64> = OutgoingConduit::new(Instant::ZERO, Duration::from_millis(10));
        assert!(!oc.needs_synch(Instant::from_millis(10_000)));
    }

    #[test]
    fn moc_evicts_only_once_every_peer_has_acked() {
        let mut moc: MulticastOutgoingConduit<32, 4> = MulticastOutgoingConduit::new(Instant::ZERO, Duration::from_millis(100));
        moc.track_peer(1);
        moc.track_peer(2);
        let s0 = moc.oc.push(rid(1), b"a", Instant::ZERO).unwrap();
        let s1 = moc.oc.push(rid(1), b"b", Instant::ZERO).unwrap();

        moc.ack(1, s1.next());
        assert!(moc.oc.copy_sample(s0, &mut [0u8; 4]).is_some(), "peer 2 hasn't acked yet");

        moc.ack(2, s1.next());
        assert!(moc.oc.copy_sample(s0, &mut [0u8; 4]).is_none());
    }
}
