//! Top-level engine (§5 "Concurrency & Resource Model"): one `Engine` owns
//! the transport, the clock, every peer's session and conduit state, and the
//! local publish/subscribe tables. There is no background thread and no
//! global state — a driver calls [`Engine::loop_once`] on whatever cadence it
//! chooses (a bare-metal main loop, an RTOS task, a test harness stepping a
//! `ManualClock`) and the engine does not retain a notion of "current time"
//! beyond what that call passes in.
//!
//! `DECLARE` traffic (§4.5) is sent directly rather than through the
//! retained/retransmitted `OutgoingConduit` ring: declarations are small,
//! infrequent, and re-sent wholesale on a fresh session rather than
//! individually retransmitted, so giving them their own reliable window
//! would just be bookkeeping with no payoff in this build.

use nanozen_timing::{Clock, Instant};
use nanozen_transport::Transport;
use nanozen_utils::ArrayStr;

use crate::codec::vle_decode;
use crate::config::EngineConfig;
use crate::conduit::Admit;
use crate::error::{EngineError, EngineResult};
use crate::packer::Packer;
use crate::peer::{Peer, PEERID_SIZE};
use crate::registry::{DispatchOutcome, PubSubRegistry, ResId};
use crate::session::{SessionDriver, SessionState};
use crate::wire::{
    scout_mask, AckNackMessage, AcceptMessage, Declaration, DeclareHeader, HelloMessage, MessageKind, OpenMessage,
    ScoutMessage, SdataHeader, SynchMessage,
};

pub struct Engine<
    T: Transport,
    C: Clock,
    const MAX_PUBS: usize = 16,
    const MAX_SUBS: usize = 16,
    const MAX_PEERS: usize = 1,
    const XMITW_BYTES: usize = 2048,
    const MTU: usize = 1500,
> {
    transport: T,
    clock: C,
    config: EngineConfig,
    own_peer_id: ArrayStr<PEERID_SIZE>,
    registry: PubSubRegistry<MAX_PUBS, MAX_SUBS>,
    peers: [Option<Peer<T::Addr, XMITW_BYTES>>; MAX_PEERS],
    sessions: [Option<SessionDriver>; MAX_PEERS],
    packer: Packer<T::Addr, MTU>,
    recv_buf: [u8; MTU],
}

impl<
        T: Transport,
        C: Clock,
        const MAX_PUBS: usize,
        const MAX_SUBS: usize,
        const MAX_PEERS: usize,
        const XMITW_BYTES: usize,
        const MTU: usize,
    > Engine<T, C, MAX_PUBS, MAX_SUBS, MAX_PEERS, XMITW_BYTES, MTU>
{
    pub fn new(config: EngineConfig, own_peer_id: &str, transport: T, clock: C) -> EngineResult<Self> {
        config.validate(MAX_PEERS)?;
        Ok(Self {
            transport,
            clock,
            config,
            own_peer_id: ArrayStr::from_str_truncate(own_peer_id),
            registry: PubSubRegistry::new(),
            peers: std::array::from_fn(|_| None),
            sessions: std::array::from_fn(|_| None),
            packer: Packer::new(),
            recv_buf: [0u8; MTU],
        })
    }

    pub fn publish(&mut self, rid: ResId, reliable: bool) -> EngineResult<usize> {
        self.registry.publish(rid, 0, reliable).ok_or(EngineError::PublicationTableFull(MAX_PUBS))
    }

    pub fn subscribe(&mut self, rid: ResId, handler: fn(ResId, &[u8])) -> EngineResult<usize> {
        self.registry.subscribe(rid, 0, handler).ok_or(EngineError::SubscriptionTableFull(MAX_SUBS))
    }

    /// Registers a remote peer by address and starts its session scouting for
    /// a broker immediately (§4.6) — this engine only ever plays the
    /// client/initiator role, so there is no inbound byte stream to wait on
    /// first. Returns the peer's slot index.
    pub fn add_peer(&mut self, addr: T::Addr, peer_id: &str, now: Instant) -> Option<usize> {
        let slot = self.peers.iter().position(|p| p.is_none())?;
        self.peers[slot] = Some(Peer::new(
            addr,
            ArrayStr::<PEERID_SIZE>::from_str_truncate(peer_id),
            now,
            self.config.lease,
            self.config.msynch_interval,
        ));
        let mut session =
            SessionDriver::new(self.config.open_retries, self.config.scout_interval, self.config.open_interval, now);
        session.start_scouting(now);
        self.sessions[slot] = Some(session);
        Some(slot)
    }

    /// Tears down a peer's slot entirely — used on lease expiry or an
    /// explicit `CLOSE`, freeing it for a future `add_peer`.
    pub fn close_peer(&mut self, slot: usize) {
        self.peers[slot] = None;
        self.sessions[slot] = None;
    }

    fn peer_slot_for_addr(&self, addr: &T::Addr) -> Option<usize> {
        self.peers.iter().position(|p| matches!(p, Some(p) if self.transport.addr_eq(&p.addr, addr)))
    }

    fn send_to(&mut self, dest: T::Addr, bytes: &[u8]) {
        Self::send_to_raw(&mut self.transport, dest, bytes);
    }

    fn send_to_raw(transport: &mut T, dest: T::Addr, bytes: &[u8]) {
        let _ = transport.send(bytes, &dest);
    }

    /// Appends `bytes` to the packer for `dest`, flushing a pending packet
    /// first if it's addressed elsewhere or the reliable conduit changed.
    fn packer_push(&mut self, dest: T::Addr, reliable_conduit: Option<u8>, bytes: &[u8]) {
        Self::packer_push_raw(&mut self.packer, &mut self.transport, dest, reliable_conduit, bytes);
    }

    /// Same as [`Self::packer_push`] but takes its fields directly so callers
    /// already holding a borrow of another disjoint field (e.g. `self.peers`)
    /// can still reach the packer and transport without borrowing all of
    /// `self`.
    fn packer_push_raw(
        packer: &mut Packer<T::Addr, MTU>,
        transport: &mut T,
        dest: T::Addr,
        reliable_conduit: Option<u8>,
        bytes: &[u8],
    ) {
        if packer.pre_check(dest, reliable_conduit).is_some() {
            if let Some((flushed, flushed_dest)) = packer.take() {
                Self::send_to_raw(transport, flushed_dest, &flushed);
            }
        }
        if packer.is_empty() {
            packer.begin(dest, reliable_conduit);
        }
        let (flushed, _) = packer.push(bytes);
        if let Some((flushed, flushed_dest)) = flushed {
            Self::send_to_raw(transport, flushed_dest, &flushed);
        }
    }

    /// Publishes `payload` on `pub_idx` to every operational peer, framing it
    /// as a reliable or unreliable `SDATA` per that publication's declared
    /// reliability, and feeding the packer so small writes coalesce into one
    /// packet per destination (§4.4). Every sample — reliable or not — is
    /// pushed through a real per-peer sequence counter so the receiver's
    /// `IncomingConduit::admit` can drop stale duplicates uniformly.
    pub fn write(&mut self, pub_idx: usize, payload: &[u8], now: Instant) -> EngineResult<()> {
        let publication = *self.registry.publication(pub_idx).ok_or(EngineError::UnknownPublication(pub_idx))?;

        for slot in 0..MAX_PEERS {
            if self.sessions[slot].as_ref().map(|s| s.state) != Some(SessionState::Operational) {
                continue;
            }
            let Some(peer) = self.peers[slot].as_mut() else { continue };

            let seq = if publication.reliable {
                peer.oc.push(publication.rid, payload, now)?
            } else {
                peer.next_unreliable_seq()
            };
            let header = SdataHeader { reliable: publication.reliable, synch: false, rid: publication.rid, seq };

            let mut buf = [0u8; 32];
            let header_len = header.encode(&mut buf).map_err(|_| EngineError::MalformedWireField)?;
            let reliable_conduit = publication.reliable.then_some(publication.conduit);
            let dest = peer.addr;

            self.packer_push(dest, reliable_conduit, &buf[..header_len]);
            self.packer_push(dest, reliable_conduit, payload);
        }
        Ok(())
    }

    /// Flushes whatever the packer is holding, regardless of fill level — the
    /// driver calls this at the end of a `loop_once` tick so a small write
    /// under the latency budget still goes out promptly.
    pub fn flush(&mut self) {
        if let Some((bytes, dest)) = self.packer.take() {
            self.send_to(dest, &bytes);
        }
    }

    /// Sends a `SYNCH` for `slot`'s outgoing conduit and rearms its timer.
    fn send_synch(&mut self, slot: usize, now: Instant) {
        let Some(peer) = self.peers[slot].as_mut() else { return };
        let seqbase = peer.oc.seqbase();
        let count = peer.oc.next_seq().signed_diff(seqbase).max(0) as u32 / crate::seqnum::SEQNUM_UNIT;
        let msg = SynchMessage { conduit: 0, seqbase, count };
        let mut buf = [0u8; 16];
        if let Ok(n) = msg.encode(&mut buf) {
            let dest = peer.addr;
            Self::packer_push_raw(&mut self.packer, &mut self.transport, dest, Some(0), &buf[..n]);
        }
        peer.oc.reschedule_synch(now);
    }

    /// Replies to a gap reported in an `ACKNACK`, resending every missing
    /// sample still resident in the outgoing conduit's ring. Offset `0` is
    /// `base` itself, unconditionally missing (it's the sequence the peer is
    /// stalled on); offset `i` for `i` in `1..=mask_len` checks mask bit
    /// `i - 1`, which is set when `base + i` already arrived.
    fn retransmit_requested(&mut self, slot: usize, msg: AckNackMessage) {
        let Some(peer) = self.peers[slot].as_mut() else { return };
        let dest = peer.addr;
        let width = msg.mask_len.min(32);
        let missing = |i: u8| i == 0 || msg.mask & (1 << (i - 1)) == 0;
        let last_missing = (0..=width).filter(|&i| missing(i)).last().unwrap_or(0);

        for i in 0..=width {
            if !missing(i) {
                continue;
            }
            let seq = msg.base.advance(i as u32);
            let mut payload = [0u8; MTU];
            if let Some((rid, len)) = peer.oc.copy_sample(seq, &mut payload) {
                let header = SdataHeader { reliable: true, synch: i == last_missing, rid, seq };
                let mut buf = [0u8; 32];
                if let Ok(header_len) = header.encode(&mut buf) {
                    Self::packer_push_raw(&mut self.packer, &mut self.transport, dest, Some(0), &buf[..header_len]);
                    Self::packer_push_raw(&mut self.packer, &mut self.transport, dest, Some(0), &payload[..len]);
                }
            }
        }
    }

    fn send_handshake_message(&mut self, slot: usize) {
        let Some(peer) = self.peers[slot].as_ref() else { return };
        let Some(session) = self.sessions[slot].as_ref() else { return };
        let dest = peer.addr;

        let mut buf = [0u8; 64];
        let encoded = match session.state {
            SessionState::ScoutSent => ScoutMessage { mask: scout_mask::BROKER }.encode(&mut buf),
            SessionState::Opening(_) => {
                OpenMessage { peer_id: self.own_peer_id, lease_millis: self.config.lease.as_millis() as u32 }
                    .encode(&mut buf)
            }
            _ => return,
        };
        if let Ok(n) = encoded {
            self.send_to(dest, &buf[..n]);
        }
    }

    fn handle_sdata(&mut self, header: SdataHeader, payload: &[u8], from: T::Addr) {
        let Some(slot) = self.peer_slot_for_addr(&from) else { return };
        let Some(peer) = self.peers[slot].as_mut() else { return };

        let ic = if header.reliable { &mut peer.ic_reliable } else { &mut peer.ic_unreliable };
        match ic.admit(header.seq) {
            Admit::Deliver => {
                // No bounded delivery queue sits between dispatch and the
                // subscriber's handler in this build (handlers run
                // synchronously on the calling thread), so there is no
                // real backpressure budget to enforce here; the registry's
                // `free_bytes` gate exists for a future bounded-queue
                // delivery path. What matters today is the coupling below:
                // a suppressed dispatch must not advance the cursor.
                let outcome = self.registry.dispatch(header.rid, payload, usize::MAX);
                // Only a genuinely delivered (or already-known-undeliverable)
                // sample advances the cursor; a backpressure suppression
                // leaves it `expected` so a retransmit/resync can still
                // reach it later (§4.7).
                if !matches!(outcome, DispatchOutcome::Suppressed(_)) {
                    let ic = if header.reliable { &mut peer.ic_reliable } else { &mut peer.ic_unreliable };
                    ic.advance_delivered(header.seq);
                }
            }
            Admit::OutOfOrder => {
                ic.record_out_of_order(header.seq);
            }
            Admit::Duplicate => {}
        }
    }

    fn handle_synch(&mut self, msg: SynchMessage, from: T::Addr) {
        let Some(slot) = self.peer_slot_for_addr(&from) else { return };
        let Some(peer) = self.peers[slot].as_mut() else { return };
        peer.ic_reliable.resync(msg.seqbase, msg.count);

        let (base, mask, mask_len) = peer.ic_reliable.gap_report();
        let ack = AckNackMessage { conduit: msg.conduit, base, mask, mask_len };
        let mut buf = [0u8; 16];
        if let Ok(n) = ack.encode(&mut buf) {
            let dest = peer.addr;
            self.packer_push(dest, Some(msg.conduit), &buf[..n]);
        }
    }

    fn handle_acknack(&mut self, msg: AckNackMessage, from: T::Addr) {
        let Some(slot) = self.peer_slot_for_addr(&from) else { return };
        if let Some(peer) = self.peers[slot].as_mut() {
            peer.oc.evict_acked(msg.base);
        }
        self.retransmit_requested(slot, msg);
    }

    fn handle_declare(&mut self, header: DeclareHeader, body: &[u8], from: T::Addr) {
        let Some(slot) = self.peer_slot_for_addr(&from) else { return };

        let mut offset = 0;
        let mut commit_id = None;
        for _ in 0..header.count {
            let Some(peer) = self.peers[slot].as_mut() else { return };
            let Ok((decl, used)) = Declaration::decode(&body[offset..]) else {
                peer.declares.abort_curpkt();
                return;
            };
            offset += used;

            match decl {
                Declaration::Subscriber { rid, mode } => {
                    let known = self.registry.local_publication_index(rid).is_some();
                    let Some(peer) = self.peers[slot].as_mut() else { return };
                    if !known {
                        peer.declares.mark_unknown_rid();
                    }
                    peer.declares.rsub_register(rid, 0, mode);
                }
                Declaration::Commit { commit_id: id } => {
                    commit_id = Some(id);
                }
                Declaration::Publisher { .. } | Declaration::Result { .. } => {}
            }
        }

        let Some(id) = commit_id else { return };
        let Some(peer) = self.peers[slot].as_mut() else { return };
        let reason = peer.declares.curpkt_reason();
        peer.declares.on_dcommit();
        peer.declares.on_dresult(reason);
        self.send_dresult(slot, id, reason);

        if let Some(session) = self.sessions[slot].as_mut() {
            session.on_first_declare_exchanged();
        }
    }

    fn send_dresult(&mut self, slot: usize, commit_id: u8, reason: u8) {
        let Some(peer) = self.peers[slot].as_ref() else { return };
        let dest = peer.addr;
        let header = DeclareHeader { seq: crate::seqnum::SeqNum::ZERO, count: 1 };
        let decl = Declaration::Result { commit_id, status: reason, rid: None };

        let mut buf = [0u8; 64];
        let Ok(header_len) = header.encode(&mut buf) else { return };
        let Ok(decl_len) = decl.encode(&mut buf[header_len..]) else { return };
        self.send_to(dest, &buf[..header_len + decl_len]);
    }

    /// Announces every local publication to a newly-operational peer, each
    /// as a `PUBLISHER` declaration followed by its own `COMMIT`, so the
    /// remote side's declare table stays in lock-step with ours per §4.5.
    fn announce_local_declarations(&mut self, slot: usize) {
        let Some(peer) = self.peers[slot].as_ref() else { return };
        let dest = peer.addr;
        for (i, publication) in self.registry.publications().iter().enumerate() {
            let header = DeclareHeader { seq: crate::seqnum::SeqNum::ZERO, count: 2 };
            let pubdecl = Declaration::Publisher { rid: publication.rid, reliable: publication.reliable };
            let commit = Declaration::Commit { commit_id: i as u8 };

            let mut buf = [0u8; 64];
            let Ok(mut n) = header.encode(&mut buf) else { continue };
            let Ok(used) = pubdecl.encode(&mut buf[n..]) else { continue };
            n += used;
            let Ok(used) = commit.encode(&mut buf[n..]) else { continue };
            n += used;
            Self::send_to_raw(&mut self.transport, dest, &buf[..n]);
        }
    }

    fn handle_scout(&mut self, from: T::Addr) {
        let msg = HelloMessage { mask: scout_mask::CLIENT };
        let mut buf = [0u8; 8];
        if let Ok(n) = msg.encode(&mut buf) {
            self.send_to(from, &buf[..n]);
        }
    }

    fn handle_hello(&mut self, from: T::Addr, now: Instant) {
        let Some(slot) = self.peer_slot_for_addr(&from) else { return };
        if let Some(session) = self.sessions[slot].as_mut() {
            session.on_hello_received(now);
        }
    }

    fn handle_open(&mut self, msg: OpenMessage, from: T::Addr) {
        let lease = nanozen_timing::Duration::from_millis(msg.lease_millis as u64);
        let reply = AcceptMessage { peer_id: msg.peer_id, broker_id: self.own_peer_id, lease_millis: msg.lease_millis };
        let mut buf = [0u8; 64];
        if let Ok(n) = reply.encode(&mut buf) {
            self.send_to(from, &buf[..n]);
        }
        if let Some(slot) = self.peer_slot_for_addr(&from) {
            if let Some(peer) = self.peers[slot].as_mut() {
                peer.set_lease(lease);
            }
        }
    }

    fn handle_accept(&mut self, msg: AcceptMessage, from: T::Addr, now: Instant) {
        let Some(slot) = self.peer_slot_for_addr(&from) else { return };
        let lease = nanozen_timing::Duration::from_millis(msg.lease_millis as u64);
        if let Some(peer) = self.peers[slot].as_mut() {
            peer.set_lease(lease);
            peer.renew_lease(now);
        }
        if let Some(session) = self.sessions[slot].as_mut() {
            session.on_accept_received(now);
        }
        self.announce_local_declarations(slot);
    }

    /// Drains one pending datagram/stream-chunk (if any) and dispatches it by
    /// message kind, renewing the sending peer's lease on any recognized
    /// traffic (§4.6's "any inbound message counts as liveness").
    fn handle_one_packet(&mut self, now: Instant) -> EngineResult<bool> {
        let Some((n, from)) = self.transport.try_recv(&mut self.recv_buf)? else { return Ok(false) };
        if n == 0 {
            return Ok(true);
        }
        let kind_byte = self.recv_buf[0];

        if let Some(slot) = self.peer_slot_for_addr(&from) {
            if let Some(session) = self.sessions[slot].as_mut() {
                session.on_input_received();
            }
            if let Some(peer) = self.peers[slot].as_mut() {
                peer.renew_lease(now);
            }
        }

        match MessageKind::from_byte(kind_byte) {
            Some(MessageKind::Sdata) => {
                if let Ok((header, used)) = SdataHeader::decode(&self.recv_buf[..n]) {
                    let mut payload = [0u8; MTU];
                    let payload_len = n - used;
                    payload[..payload_len].copy_from_slice(&self.recv_buf[used..n]);
                    self.handle_sdata(header, &payload[..payload_len], from);
                }
            }
            Some(MessageKind::Synch) => {
                if let Ok((msg, _)) = SynchMessage::decode(&self.recv_buf[..n]) {
                    self.handle_synch(msg, from);
                }
            }
            Some(MessageKind::AckNack) => {
                if let Ok((msg, _)) = AckNackMessage::decode(&self.recv_buf[..n]) {
                    self.handle_acknack(msg, from);
                }
            }
            Some(MessageKind::Declare) => {
                if let Ok((header, used)) = DeclareHeader::decode(&self.recv_buf[..n]) {
                    let body_end = n;
                    let mut body = [0u8; MTU];
                    body[..body_end - used].copy_from_slice(&self.recv_buf[used..body_end]);
                    self.handle_declare(header, &body[..body_end - used], from);
                }
            }
            Some(MessageKind::Scout) => {
                self.handle_scout(from);
            }
            Some(MessageKind::Hello) => {
                self.handle_hello(from, now);
            }
            Some(MessageKind::Open) => {
                if let Ok((msg, _)) = OpenMessage::decode(&self.recv_buf[..n]) {
                    self.handle_open(msg, from);
                }
            }
            Some(MessageKind::Accept) => {
                if let Ok((msg, _)) = AcceptMessage::decode(&self.recv_buf[..n]) {
                    self.handle_accept(msg, from, now);
                }
            }
            Some(MessageKind::Close) => {
                if let Some(slot) = self.peer_slot_for_addr(&from) {
                    if let Some(session) = self.sessions[slot].as_mut() {
                        session.on_close_received();
                    }
                }
            }
            _ => {
                tracing::trace!(kind = kind_byte, "unhandled message kind");
            }
        }
        Ok(true)
    }

    /// One iteration of the cooperative loop: drain all pending input, tick
    /// every peer's session timers (sending whatever handshake message the
    /// new state calls for), expire dead leases, send any overdue `SYNCH`,
    /// then flush. Returns the earliest instant a timer in this engine next
    /// needs attention, for a driver that wants to sleep rather than
    /// busy-poll.
    pub fn loop_once(&mut self, now: Instant) -> EngineResult<Instant> {
        while self.handle_one_packet(now)? {}

        for slot in 0..MAX_PEERS {
            let expired = self.peers[slot].as_ref().map(|p| p.lease_expired(now)).unwrap_or(false);
            if expired {
                if let Some(session) = self.sessions[slot].as_mut() {
                    session.on_lease_expired();
                }
                self.close_peer(slot);
                continue;
            }

            let wants_send = self.sessions[slot].as_mut().map(|s| s.tick(now)).unwrap_or(false);
            if wants_send {
                self.send_handshake_message(slot);
            }

            let needs_synch = self.peers[slot].as_ref().map(|p| p.oc.needs_synch(now)).unwrap_or(false);
            if needs_synch {
                self.send_synch(slot, now);
            }
        }

        self.flush();
        Ok(now + self.config.scout_interval)
    }

    /// Convenience for a driver that doesn't track time itself — most
    /// embedded drivers do, and should pass their own reading into
    /// [`Engine::loop_once`] instead.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn decode_rid(buf: &[u8]) -> EngineResult<(ResId, usize)> {
        let (raw, used) = vle_decode(buf).map_err(|_| EngineError::MalformedWireField)?;
        Ok((ResId::new(raw).ok_or(EngineError::MalformedWireField)?, used))
    }
}
