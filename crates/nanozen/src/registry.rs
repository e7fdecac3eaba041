use std::num::NonZeroU32;

use nanozen_utils::ArrayVec;

/// A resource id. Wire-encoded as a VLE `u32`; `0` never appears on the wire as a
/// real id in this build (the distilled-from source uses it as "no resource"), so
/// it is carved out at the type level instead of re-checked at every call site —
/// the decided resolution to the §9 "can rid 0 ever be valid" open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResId(NonZeroU32);

impl ResId {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for ResId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locally-declared resource this engine publishes on. `conduit` picks the
/// outgoing conduit an `SDATA` for this resource travels on (§3 "Publication");
/// in this build conduit 0 is the only one wired into `Engine`.
#[derive(Debug, Clone, Copy)]
pub struct Publication {
    pub rid: ResId,
    pub conduit: u8,
    pub reliable: bool,
}

/// A locally-declared interest in a resource. `xmitneed` mirrors the source's
/// `xmitneed` counter on in-conduits: a subscription that cannot currently keep
/// up (the registry's last `dispatch` for it hit the `free_bytes` gate) counts
/// up rather than toggling a single bit, so a burst of suppressed deliveries
/// doesn't get silently forgotten by a single later delivery that happens to
/// succeed — `clear_xmitneed` is the only thing that zeroes it.
#[derive(Clone, Copy)]
pub struct Subscription {
    pub rid: ResId,
    pub conduit: u8,
    handler: fn(ResId, &[u8]),
    xmitneed: usize,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("rid", &self.rid)
            .field("conduit", &self.conduit)
            .field("xmitneed", &self.xmitneed)
            .finish()
    }
}

/// What happened to an inbound `SDATA` once it reached the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No subscription registered for this `rid`; nothing to deliver.
    NoSubscriber,
    /// Delivered to the first matching subscription, at the given index.
    Delivered(usize),
    /// A subscription matched but the caller's `free_bytes` budget was
    /// exhausted; its `xmitneed` counter was bumped instead of delivering.
    Suppressed(usize),
}

/// Fixed-capacity publication and subscription tables plus inbound dispatch, per
/// §4.7. Handlers are plain function pointers rather than boxed closures: the
/// engine never allocates on a subscriber's behalf, so per-subscription state
/// that a handler needs must live in the caller's own storage, reached the way a
/// C callback reaches its state — through a side channel the handler closes over
/// at the call site (a static, or a cell the handler itself indexes by `rid`).
pub struct PubSubRegistry<const MAX_PUBS: usize, const MAX_SUBS: usize> {
    pubs: ArrayVec<Publication, MAX_PUBS>,
    subs: ArrayVec<Subscription, MAX_SUBS>,
}

impl<const MAX_PUBS: usize, const MAX_SUBS: usize> Default for PubSubRegistry<MAX_PUBS, MAX_SUBS> {
    fn default() -> Self {
        Self { pubs: ArrayVec::new(), subs: ArrayVec::new() }
    }
}

impl<const MAX_PUBS: usize, const MAX_SUBS: usize> PubSubRegistry<MAX_PUBS, MAX_SUBS> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, rid: ResId, conduit: u8, reliable: bool) -> Option<usize> {
        if self.pubs.iter().any(|p| p.rid == rid) {
            return None;
        }
        if self.pubs.len() == MAX_PUBS {
            return None;
        }
        self.pubs.push(Publication { rid, conduit, reliable });
        Some(self.pubs.len() - 1)
    }

    pub fn subscribe(&mut self, rid: ResId, conduit: u8, handler: fn(ResId, &[u8])) -> Option<usize> {
        if self.subs.len() == MAX_SUBS {
            return None;
        }
        self.subs.push(Subscription { rid, conduit, handler, xmitneed: 0 });
        Some(self.subs.len() - 1)
    }

    pub fn publication(&self, idx: usize) -> Option<&Publication> {
        self.pubs.get(idx)
    }

    /// Index of the local publication declared on `rid`, if any — used when a
    /// peer's `DECLARE` names a resource this side already publishes, so the
    /// `DCOMMIT`/`DRESULT` exchange can bind the remote subscription to the
    /// right outgoing conduit instead of re-deriving it from the wire.
    pub fn local_publication_index(&self, rid: ResId) -> Option<usize> {
        self.pubs.iter().position(|p| p.rid == rid)
    }

    pub fn publications(&self) -> &[Publication] {
        &self.pubs
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subs
    }

    /// Dispatches an inbound `SDATA` payload to the first local subscription
    /// matching `rid` (§4.7's "first match wins" rather than fan-out to
    /// every subscriber — a second subscription on the same `rid` exists for
    /// failover, not duplication). `free_bytes` is the caller's remaining
    /// backpressure budget for this delivery; when it's `0` the match is
    /// recorded as `Suppressed` and its `xmitneed` counter is bumped instead
    /// of invoking the handler, so the incoming conduit's cursor-advance
    /// decision (owned by the caller) can see that nothing was actually
    /// delivered.
    pub fn dispatch(&mut self, rid: ResId, payload: &[u8], free_bytes: usize) -> DispatchOutcome {
        let Some(idx) = self.subs.iter().position(|s| s.rid == rid) else {
            return DispatchOutcome::NoSubscriber;
        };

        if free_bytes < payload.len() {
            self.subs[idx].xmitneed += 1;
            return DispatchOutcome::Suppressed(idx);
        }

        let sub = self.subs[idx];
        (sub.handler)(rid, payload);
        self.subs[idx].xmitneed = 0;
        DispatchOutcome::Delivered(idx)
    }

    pub fn xmitneed(&self, idx: usize) -> usize {
        self.subs.get(idx).map(|s| s.xmitneed).unwrap_or(0)
    }

    pub fn clear_xmitneed(&mut self, idx: usize) {
        if let Some(sub) = self.subs.get_mut(idx) {
            sub.xmitneed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static LAST_LEN: AtomicU32 = AtomicU32::new(0);

    fn record_len(_rid: ResId, payload: &[u8]) {
        LAST_LEN.store(payload.len() as u32, Ordering::SeqCst);
    }

    #[test]
    fn resid_zero_is_rejected() {
        assert!(ResId::new(0).is_none());
        assert!(ResId::new(1).is_some());
    }

    #[test]
    fn publish_rejects_duplicates_and_overflow() {
        let mut reg: PubSubRegistry<2, 2> = PubSubRegistry::new();
        let rid = ResId::new(7).unwrap();
        assert!(reg.publish(rid, 0, true).is_some());
        assert!(reg.publish(rid, 0, true).is_none());
        assert!(reg.publish(ResId::new(8).unwrap(), 0, true).is_some());
        assert!(reg.publish(ResId::new(9).unwrap(), 0, true).is_none());
    }

    #[test]
    fn local_publication_index_finds_a_matching_rid() {
        let mut reg: PubSubRegistry<2, 2> = PubSubRegistry::new();
        let rid = ResId::new(7).unwrap();
        let idx = reg.publish(rid, 0, true).unwrap();
        assert_eq!(reg.local_publication_index(rid), Some(idx));
        assert_eq!(reg.local_publication_index(ResId::new(9).unwrap()), None);
    }

    #[test]
    fn dispatch_delivers_to_the_first_match_only() {
        let mut reg: PubSubRegistry<2, 4> = PubSubRegistry::new();
        let rid_a = ResId::new(1).unwrap();
        let rid_b = ResId::new(2).unwrap();
        let first = reg.subscribe(rid_a, 0, record_len).unwrap();
        reg.subscribe(rid_a, 0, |_, _| panic!("second match should not fire"));
        reg.subscribe(rid_b, 0, |_, _| panic!("should not fire for rid_b"));

        let outcome = reg.dispatch(rid_a, &[1, 2, 3], usize::MAX);
        assert_eq!(outcome, DispatchOutcome::Delivered(first));
        assert_eq!(LAST_LEN.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dispatch_with_no_subscriber_reports_that_explicitly() {
        let mut reg: PubSubRegistry<1, 1> = PubSubRegistry::new();
        let rid = ResId::new(3).unwrap();
        assert_eq!(reg.dispatch(rid, &[1], usize::MAX), DispatchOutcome::NoSubscriber);
    }

    #[test]
    fn backpressure_suppresses_delivery_and_counts_xmitneed() {
        let mut reg: PubSubRegistry<1, 1> = PubSubRegistry::new();
        let rid = ResId::new(3).unwrap();
        let idx = reg.subscribe(rid, 0, record_len).unwrap();

        assert_eq!(reg.dispatch(rid, &[9, 9], 1), DispatchOutcome::Suppressed(idx));
        assert_eq!(reg.xmitneed(idx), 1);
        assert_eq!(reg.dispatch(rid, &[9, 9], 1), DispatchOutcome::Suppressed(idx));
        assert_eq!(reg.xmitneed(idx), 2);

        assert_eq!(reg.dispatch(rid, &[1, 2, 3], usize::MAX), DispatchOutcome::Delivered(idx));
        assert_eq!(reg.xmitneed(idx), 0);
        assert_eq!(LAST_LEN.load(Ordering::SeqCst), 3);
    }
}
