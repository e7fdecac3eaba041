//! Packet packer (§4.4): accumulates message bytes into a single MTU-sized
//! buffer and decides when to flush it onto the wire. A packet is flushed
//! whenever the next message would overflow the MTU, the destination peer
//! changes, a second reliable conduit's bytes would land in the same packet
//! (at most one reliable conduit per packet, so a `SYNCH`'s sequence count
//! unambiguously describes the whole packet), or the buffer crosses three
//! quarters full — matching the source's habit of sending a `SYNCH` early
//! rather than waiting for a packet to be completely full before it can even
//! be acknowledged.

use nanozen_utils::ArrayVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    DestinationChanged,
    ConduitChanged,
    WouldOverflow,
    ThreeQuartersFull,
    Explicit,
}

pub struct Packer<Addr, const MTU: usize> {
    buf: [u8; MTU],
    len: usize,
    dest: Option<Addr>,
    reliable_conduit: Option<u8>,
}

impl<Addr: Copy + Eq, const MTU: usize> Packer<Addr, MTU> {
    pub fn new() -> Self {
        Self { buf: [0u8; MTU], len: 0, dest: None, reliable_conduit: None }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn three_quarters_full(&self) -> bool {
        self.len * 4 >= MTU * 3
    }

    /// Checks whether writing for `dest`/`conduit` requires flushing first,
    /// without writing anything. The caller flushes (via [`Self::take`]) if
    /// this returns `Some`, then calls [`Self::begin`] for the new packet.
    pub fn pre_check(&self, dest: Addr, reliable_conduit: Option<u8>) -> Option<FlushReason> {
        if self.is_empty() {
            return None;
        }
        if self.dest != Some(dest) {
            return Some(FlushReason::DestinationChanged);
        }
        if let (Some(current), Some(incoming)) = (self.reliable_conduit, reliable_conduit) {
            if current != incoming {
                return Some(FlushReason::ConduitChanged);
            }
        }
        None
    }

    /// Establishes (or confirms) the destination/conduit for the packet
    /// currently being assembled. Must only be called on an empty packer.
    pub fn begin(&mut self, dest: Addr, reliable_conduit: Option<u8>) {
        debug_assert!(self.is_empty());
        self.dest = Some(dest);
        if reliable_conduit.is_some() {
            self.reliable_conduit = reliable_conduit;
        }
    }

    /// Appends `bytes`, flushing first if they would not fit. Returns the
    /// flushed packet (if a flush was needed) alongside its destination.
    pub fn push(&mut self, bytes: &[u8]) -> (Option<(ArrayVec<u8, MTU>, Addr)>, FlushReason) {
        if self.len + bytes.len() > MTU {
            let dest = self.dest;
            let reliable_conduit = self.reliable_conduit;
            let flushed = self.take();
            self.buf[..bytes.len()].copy_from_slice(bytes);
            self.len = bytes.len();
            // The write that overflowed the packet continues into a fresh one
            // addressed the same way — `take` cleared `dest`, so restore it
            // rather than leaving the new packet without a destination.
            self.dest = dest;
            self.reliable_conduit = reliable_conduit;
            return (flushed, FlushReason::WouldOverflow);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        if self.three_quarters_full() {
            return (None, FlushReason::ThreeQuartersFull);
        }
        (None, FlushReason::Explicit)
    }

    pub fn should_flush_for_fullness(&self) -> bool {
        !self.is_empty() && self.three_quarters_full()
    }

    /// Empties the packer, returning its contents paired with the destination
    /// they were addressed to. `None` if nothing was buffered.
    pub fn take(&mut self) -> Option<(ArrayVec<u8, MTU>, Addr)> {
        if self.is_empty() {
            return None;
        }
        let mut out = ArrayVec::new();
        out.extend(self.buf[..self.len].iter().copied());
        let dest = self.dest.take().expect("non-empty packer always has a destination");
        self.len = 0;
        self.reliable_conduit = None;
        Some((out, dest))
    }
}

impl<Addr: Copy + Eq, const MTU: usize> Default for Packer<Addr, MTU> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_three_quarters_full() {
        let mut packer: Packer<u8, 16> = Packer::new();
        packer.begin(1, None);
        let (flushed, reason) = packer.push(&[0u8; 8]);
        assert!(flushed.is_none());
        assert_eq!(reason, FlushReason::ThreeQuartersFull);
    }

    #[test]
    fn destination_change_requires_flush() {
        let mut packer: Packer<u8, 16> = Packer::new();
        packer.begin(1, None);
        packer.push(&[1, 2, 3]);
        assert_eq!(packer.pre_check(2, None), Some(FlushReason::DestinationChanged));
    }

    #[test]
    fn second_reliable_conduit_requires_flush() {
        let mut packer: Packer<u8, 16> = Packer::new();
        packer.begin(1, Some(0));
        packer.push(&[1]);
        assert_eq!(packer.pre_check(1, Some(1)), Some(FlushReason::ConduitChanged));
        assert_eq!(packer.pre_check(1, Some(0)), None);
    }

    #[test]
    fn overflow_flushes_and_starts_the_next_packet() {
        let mut packer: Packer<u8, 8> = Packer::new();
        packer.begin(9, None);
        packer.push(&[0u8; 6]);
        let (flushed, reason) = packer.push(&[9u8; 4]);
        assert_eq!(reason, FlushReason::WouldOverflow);
        let (bytes, dest) = flushed.unwrap();
        assert_eq!(&bytes[..], &[0u8; 6]);
        assert_eq!(dest, 9);
        assert_eq!(packer.len(), 4);
    }

    #[test]
    fn take_on_empty_packer_is_none() {
        let mut packer: Packer<u8, 8> = Packer::new();
        assert!(packer.take().is_none());
    }
}
