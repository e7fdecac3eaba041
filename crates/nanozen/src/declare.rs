//! Declare transaction pipeline (§4.5): resource/publisher/subscriber
//! declarations are staged in two precommit phases before a `DCOMMIT`/
//! `DRESULT` round makes them visible, so a peer's in-flight declarations
//! never partially apply if the connection drops mid-transaction.
//!
//! `precommit_curpkt` holds declarations seen in the packet currently being
//! processed; on the packet's `COMMIT` declaration they fold into
//! `precommit` (this peer's not-yet-committed state); once the caller has
//! decided the `DRESULT` reason and fed it back via [`DeclareTransaction::on_dresult`],
//! a clean result folds `precommit` again into `committed`, the peer's live,
//! dispatch-visible subscriptions. Any failure reason instead discards the
//! precommit stage without touching `committed`.

use nanozen_utils::ArrayVec;

use crate::registry::ResId;
use crate::wire::{decl_mode, dresult_reason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteSub {
    pub rid: ResId,
    pub conduit: u8,
}

/// One peer's three-stage declare state, per §4.5.
pub struct DeclareTransaction<const MAX_RSUBS: usize> {
    precommit_curpkt: ArrayVec<RemoteSub, MAX_RSUBS>,
    /// Set when the current packet contains a `SUBSCRIBER` declaration whose
    /// mode isn't `PUSH` — this build only ever serves push delivery.
    curpkt_non_push: bool,
    /// Set by the caller when a declaration in the current packet names a
    /// resource this side has no local publication for.
    curpkt_unknown_rid: bool,
    precommit: ArrayVec<RemoteSub, MAX_RSUBS>,
    committed: ArrayVec<RemoteSub, MAX_RSUBS>,
}

impl<const MAX_RSUBS: usize> Default for DeclareTransaction<MAX_RSUBS> {
    fn default() -> Self {
        Self {
            precommit_curpkt: ArrayVec::new(),
            curpkt_non_push: false,
            curpkt_unknown_rid: false,
            precommit: ArrayVec::new(),
            committed: ArrayVec::new(),
        }
    }
}

impl<const MAX_RSUBS: usize> DeclareTransaction<MAX_RSUBS> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> &[RemoteSub] {
        &self.committed
    }

    /// Registers a `SUBSCRIBER` declaration seen within the packet currently
    /// being parsed. A non-`PUSH` mode marks the whole packet's transaction
    /// for `NON_PUSH` failure rather than being staged (§4.5's "non-push
    /// declarations fail with NON_PUSH"); the caller still keeps decoding the
    /// rest of the packet. Returns `false` only when a legitimate `PUSH`
    /// declaration can't be staged because the precommit table is full — the
    /// caller should fail the whole packet's declarations in that case
    /// (§4.5 "a full precommit table fails the transaction, not just the one
    /// declaration").
    pub fn rsub_register(&mut self, rid: ResId, conduit: u8, mode: u8) -> bool {
        if mode != decl_mode::PUSH {
            self.curpkt_non_push = true;
            return true;
        }
        if self.precommit_curpkt.iter().any(|r| r.rid == rid) {
            return true;
        }
        if self.precommit_curpkt.is_full() {
            return false;
        }
        self.precommit_curpkt.push(RemoteSub { rid, conduit });
        true
    }

    /// Flags the current packet's transaction as referencing at least one
    /// resource this side doesn't locally publish. The caller is the only
    /// one with access to the publication table, so it calls this instead of
    /// `DeclareTransaction` re-deriving the check itself.
    pub fn mark_unknown_rid(&mut self) {
        self.curpkt_unknown_rid = true;
    }

    /// The `DRESULT` reason byte this packet's transaction has earned so
    /// far, via [`encode_dresult_reason`]. Read this before [`Self::on_dcommit`]
    /// clears the per-packet flags.
    pub fn curpkt_reason(&self) -> u8 {
        encode_dresult_reason(self.curpkt_unknown_rid, self.curpkt_non_push)
    }

    /// Folds the current packet's staged declarations into the
    /// not-yet-committed set on seeing a `COMMIT` declaration, clearing the
    /// per-packet stage. Folding happens unconditionally here — whether it
    /// ultimately becomes visible is decided by the `DRESULT` reason passed
    /// to [`Self::on_dresult`].
    pub fn on_dcommit(&mut self) -> bool {
        let mut ok = true;
        for r in self.precommit_curpkt.iter() {
            if self.precommit.iter().any(|p| p.rid == r.rid) {
                continue;
            }
            if self.precommit.try_push(*r).is_some() {
                ok = false;
            }
        }
        self.precommit_curpkt.clear();
        ok
    }

    /// Applies the `DRESULT` this side decided to send back: a zero `reason`
    /// commits everything staged since the last commit into the live set;
    /// any bit set instead discards the precommit stage, per the
    /// failure-reason encoding in [`encode_dresult_reason`].
    pub fn on_dresult(&mut self, reason: u8) {
        if reason == 0 {
            for r in self.precommit.iter() {
                if self.committed.iter().any(|c| c.rid == r.rid) {
                    continue;
                }
                let _ = self.committed.try_push(*r);
            }
        }
        self.precommit.clear();
        self.curpkt_non_push = false;
        self.curpkt_unknown_rid = false;
    }

    /// A genuine decode failure (truncated/malformed bytes, not a semantic
    /// rejection) discards the current packet's staging without folding
    /// anything and without a `DRESULT` round — there was no well-formed
    /// `COMMIT` to respond to.
    pub fn abort_curpkt(&mut self) {
        self.precommit_curpkt.clear();
        self.curpkt_non_push = false;
        self.curpkt_unknown_rid = false;
    }

    /// Drops all state for this peer, e.g. on session close and re-open.
    pub fn reset(&mut self) {
        self.precommit_curpkt.clear();
        self.precommit.clear();
        self.committed.clear();
        self.curpkt_non_push = false;
        self.curpkt_unknown_rid = false;
    }
}

pub fn encode_dresult_reason(unknown_rid: bool, non_push: bool) -> u8 {
    let mut reason = 0u8;
    if non_push {
        reason |= dresult_reason::NON_PUSH;
    }
    if unknown_rid {
        reason |= dresult_reason::UNKNOWN_RID;
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(n: u32) -> ResId {
        ResId::new(n).unwrap()
    }

    #[test]
    fn full_commit_round_trip_exposes_the_subscription() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        assert!(tx.rsub_register(rid(1), 0, decl_mode::PUSH));
        tx.on_dcommit();
        assert_eq!(tx.curpkt_reason(), 0);
        tx.on_dresult(0);
        assert_eq!(tx.committed(), &[RemoteSub { rid: rid(1), conduit: 0 }]);
    }

    #[test]
    fn non_push_mode_fails_with_non_push_and_never_stages() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        assert!(tx.rsub_register(rid(1), 0, decl_mode::PUSH + 1));
        let reason = tx.curpkt_reason();
        assert_eq!(reason, dresult_reason::NON_PUSH);
        tx.on_dcommit();
        tx.on_dresult(reason);
        assert!(tx.committed().is_empty());
    }

    #[test]
    fn unknown_rid_marked_by_the_caller_fails_the_transaction() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        tx.rsub_register(rid(1), 0, decl_mode::PUSH);
        tx.mark_unknown_rid();
        let reason = tx.curpkt_reason();
        assert_eq!(reason, dresult_reason::UNKNOWN_RID);
        tx.on_dcommit();
        tx.on_dresult(reason);
        assert!(tx.committed().is_empty());
    }

    #[test]
    fn failed_dresult_discards_the_precommit_stage() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        tx.rsub_register(rid(1), 0, decl_mode::PUSH);
        tx.on_dcommit();
        tx.on_dresult(dresult_reason::UNKNOWN_RID);
        assert!(tx.committed().is_empty());
    }

    #[test]
    fn second_transaction_adds_without_losing_the_first() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        tx.rsub_register(rid(1), 0, decl_mode::PUSH);
        tx.on_dcommit();
        tx.on_dresult(0);

        tx.rsub_register(rid(2), 1, decl_mode::PUSH);
        tx.on_dcommit();
        tx.on_dresult(0);

        assert_eq!(tx.committed().len(), 2);
    }

    #[test]
    fn precommit_table_full_fails_the_whole_packet() {
        let mut tx: DeclareTransaction<1> = DeclareTransaction::new();
        assert!(tx.rsub_register(rid(1), 0, decl_mode::PUSH));
        assert!(!tx.rsub_register(rid(2), 0, decl_mode::PUSH));
    }

    #[test]
    fn abort_curpkt_drops_staging_without_a_dresult_round() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        tx.rsub_register(rid(1), 0, decl_mode::PUSH);
        tx.abort_curpkt();
        tx.on_dcommit();
        tx.on_dresult(0);
        assert!(tx.committed().is_empty());
    }

    #[test]
    fn reset_clears_committed_state_too() {
        let mut tx: DeclareTransaction<4> = DeclareTransaction::new();
        tx.rsub_register(rid(1), 0, decl_mode::PUSH);
        tx.on_dcommit();
        tx.on_dresult(0);
        assert!(!tx.committed().is_empty());

        tx.reset();
        assert!(tx.committed().is_empty());
    }
}
