//! Wire message framing (§6 "Wire protocol"): message kinds, header flags, and
//! the declaration kinds carried inside a `DECLARE`. Encoding here is
//! deliberately shallow — each message type knows how to write its own header
//! and fixed fields into a caller-supplied buffer via the VLE codec in
//! [`crate::codec`]; the packer ([`crate::packer`]) owns buffer layout and
//! flush policy, and the declare pipeline ([`crate::declare`]) owns the
//! declaration-level commit/precommit semantics.

use crate::codec::{vle_decode, vle_encode, vle_len, CodecError, CodecResult};
use crate::peer::PEERID_SIZE;
use crate::registry::ResId;
use crate::seqnum::SeqNum;
use nanozen_utils::ArrayStr;

/// `mid` nibble, low 4 bits of the header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Scout = 0x01,
    Hello = 0x02,
    Open = 0x03,
    Accept = 0x04,
    Close = 0x05,
    Declare = 0x06,
    Sdata = 0x07,
    Ping = 0x08,
    Pong = 0x09,
    Synch = 0x0a,
    AckNack = 0x0b,
    KeepAlive = 0x0c,
    Conduit = 0x0d,
}

impl MessageKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b & 0x0f {
            0x01 => Self::Scout,
            0x02 => Self::Hello,
            0x03 => Self::Open,
            0x04 => Self::Accept,
            0x05 => Self::Close,
            0x06 => Self::Declare,
            0x07 => Self::Sdata,
            0x08 => Self::Ping,
            0x09 => Self::Pong,
            0x0a => Self::Synch,
            0x0b => Self::AckNack,
            0x0c => Self::KeepAlive,
            0x0d => Self::Conduit,
            _ => return None,
        })
    }
}

/// Header flag bits, high nibble of the header byte: (R)eliable, (S)ynch
/// request/marker, (P)roperties present, (M)ask present. `S` on an `SDATA`
/// marks the last message of a retransmit burst (asking the peer to report
/// back its gap state immediately); `S` on a stand-alone `SYNCH` asks the
/// receiving peer to reply with an `ACKNACK` even if it has nothing missing.
/// `M` on an `ACKNACK` says the mask/mask_len fields are present at all — a
/// peer with nothing buffered out of order has no mask to report.
pub mod flags {
    pub const RELIABLE: u8 = 1 << 4;
    pub const SYNCH: u8 = 1 << 5;
    pub const PROPERTIES: u8 = 1 << 6;
    pub const MASK: u8 = 1 << 7;
}

pub fn header_byte(kind: MessageKind, flag_bits: u8) -> u8 {
    kind as u8 | flag_bits
}

/// A declaration kind carried inside a `DECLARE` body (§4.5). `Resource`,
/// `Selection`, `BindId` and `DeleteRes` round out the wire enum for byte
/// compatibility but have no corresponding [`Declaration`] body in this
/// build — this engine only ever declares/receives plain push subscriptions
/// and publications, never named resources, query selections or id binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeclKind {
    Resource = 0x01,
    Publisher = 0x02,
    Subscriber = 0x03,
    Selection = 0x04,
    BindId = 0x05,
    Commit = 0x06,
    Result = 0x07,
    DeleteRes = 0x08,
}

impl DeclKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::Resource,
            0x02 => Self::Publisher,
            0x03 => Self::Subscriber,
            0x04 => Self::Selection,
            0x05 => Self::BindId,
            0x06 => Self::Commit,
            0x07 => Self::Result,
            0x08 => Self::DeleteRes,
            _ => return None,
        })
    }
}

/// Failure-reason bits for `DRESULT` (§4.5): more than one may be set when a
/// single declaration fails for several reasons at once.
pub mod dresult_reason {
    pub const NON_PUSH: u8 = 1;
    pub const UNKNOWN_RID: u8 = 2;
    pub const SELECTIONS: u8 = 4;
    pub const BINDINGS: u8 = 8;
    pub const DELETE_RES: u8 = 16;
}

/// Declaration mode byte on a `SUBSCRIBER` declaration: this build only ever
/// declares or accepts `PUSH` mode, matching the §4.5 "non-push declarations
/// fail with NON_PUSH" edge case.
pub mod decl_mode {
    pub const PUSH: u8 = 0;
}

/// `SDATA`'s header. `seq` is always present here — every sample, reliable or
/// not, has its own per-peer sequence number (the reliable conduit's retained
/// window cursor, or the unreliable conduit's best-effort one); `synch` marks
/// the last message of an `ACKNACK`-triggered retransmit burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdataHeader {
    pub reliable: bool,
    pub synch: bool,
    pub rid: ResId,
    pub seq: SeqNum,
}

impl SdataHeader {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.is_empty() {
            return Err(CodecError::NoSpace);
        }
        let mut flag = 0u8;
        if self.reliable {
            flag |= flags::RELIABLE;
        }
        if self.synch {
            flag |= flags::SYNCH;
        }
        buf[0] = header_byte(MessageKind::Sdata, flag);
        let mut n = 1;
        n += vle_encode(&mut buf[n..], self.rid.get())?;
        n += vle_encode(&mut buf[n..], self.seq.0)?;
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.is_empty() {
            return Err(CodecError::Truncated);
        }
        let header = buf[0];
        let reliable = header & flags::RELIABLE != 0;
        let synch = header & flags::SYNCH != 0;
        let mut n = 1;
        let (rid_raw, used) = vle_decode(&buf[n..])?;
        n += used;
        let rid = ResId::new(rid_raw).ok_or(CodecError::Overflow)?;
        let (seq, used) = vle_decode(&buf[n..])?;
        n += used;
        Ok((Self { reliable, synch, rid, seq: SeqNum(seq) }, n))
    }
}

/// `SYNCH` announces a conduit's sequence-number range: `seqbase` is the
/// sender's current window floor, `count` the number of samples outstanding
/// from there (§4.6 `handle_msynch`). A receiver folds this into its incoming
/// conduit's cursor even before any of those samples individually arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynchMessage {
    pub conduit: u8,
    pub seqbase: SeqNum,
    pub count: u32,
}

impl SynchMessage {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.len() < 2 {
            return Err(CodecError::NoSpace);
        }
        buf[0] = header_byte(MessageKind::Synch, flags::RELIABLE);
        buf[1] = self.conduit;
        let mut n = 2;
        n += vle_encode(&mut buf[n..], self.seqbase.0)?;
        n += vle_encode(&mut buf[n..], self.count)?;
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.len() < 2 {
            return Err(CodecError::Truncated);
        }
        let conduit = buf[1];
        let mut n = 2;
        let (seqbase, used) = vle_decode(&buf[n..])?;
        n += used;
        let (count, used) = vle_decode(&buf[n..])?;
        n += used;
        Ok((Self { conduit, seqbase: SeqNum(seqbase), count }, n))
    }
}

/// `ACKNACK`'s mask bit `i` set means "`base + (i+1)` has already arrived"
/// (§4.3's "have" semantics, not "missing" — a sender resends `base` plus
/// every offset whose bit is *clear*). The mask is only present when the `M`
/// flag is set; a peer reporting no out-of-order arrivals at all sends a
/// bare `base` with no mask bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckNackMessage {
    pub conduit: u8,
    pub base: SeqNum,
    pub mask: u32,
    pub mask_len: u8,
}

impl AckNackMessage {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.len() < 2 {
            return Err(CodecError::NoSpace);
        }
        let has_mask = self.mask_len > 0;
        let flag = flags::RELIABLE | if has_mask { flags::MASK } else { 0 };
        buf[0] = header_byte(MessageKind::AckNack, flag);
        buf[1] = self.conduit;
        let mut n = 2;
        n += vle_encode(&mut buf[n..], self.base.0)?;
        if has_mask {
            if n >= buf.len() {
                return Err(CodecError::NoSpace);
            }
            buf[n] = self.mask_len;
            n += 1;
            n += vle_encode(&mut buf[n..], self.mask)?;
        }
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.len() < 2 {
            return Err(CodecError::Truncated);
        }
        let header = buf[0];
        let has_mask = header & flags::MASK != 0;
        let conduit = buf[1];
        let mut n = 2;
        let (base, used) = vle_decode(&buf[n..])?;
        n += used;
        if !has_mask {
            return Ok((Self { conduit, base: SeqNum(base), mask: 0, mask_len: 0 }, n));
        }
        if n >= buf.len() {
            return Err(CodecError::Truncated);
        }
        let mask_len = buf[n];
        n += 1;
        let (mask, used) = vle_decode(&buf[n..])?;
        n += used;
        Ok((Self { conduit, base: SeqNum(base), mask, mask_len }, n))
    }

    /// Length this message would take once `mask_len` bits of "have"
    /// information are known, used by the packer to decide whether an
    /// `ACKNACK` still fits before the MTU closes (§4.4).
    pub fn encoded_len(base: SeqNum, mask: u32, mask_len: u8) -> usize {
        let fixed = 2 + vle_len(base.0);
        if mask_len == 0 {
            fixed
        } else {
            fixed + 1 + vle_len(mask)
        }
    }
}

/// `SCOUT`'s mask selects which role(s) the scouter is looking for.
pub mod scout_mask {
    pub const CLIENT: u8 = 1;
    pub const PEER: u8 = 2;
    pub const BROKER: u8 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoutMessage {
    pub mask: u8,
}

impl ScoutMessage {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.len() < 2 {
            return Err(CodecError::NoSpace);
        }
        buf[0] = header_byte(MessageKind::Scout, 0);
        buf[1] = self.mask;
        Ok(2)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.len() < 2 {
            return Err(CodecError::Truncated);
        }
        Ok((Self { mask: buf[1] }, 2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloMessage {
    pub mask: u8,
}

impl HelloMessage {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.len() < 2 {
            return Err(CodecError::NoSpace);
        }
        buf[0] = header_byte(MessageKind::Hello, 0);
        buf[1] = self.mask;
        Ok(2)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.len() < 2 {
            return Err(CodecError::Truncated);
        }
        Ok((Self { mask: buf[1] }, 2))
    }
}

fn encode_peer_id(buf: &mut [u8], id: &ArrayStr<PEERID_SIZE>) -> CodecResult<usize> {
    let bytes = id.as_str().as_bytes();
    if buf.is_empty() || bytes.len() > buf.len() - 1 || bytes.len() > u8::MAX as usize {
        return Err(CodecError::NoSpace);
    }
    buf[0] = bytes.len() as u8;
    buf[1..1 + bytes.len()].copy_from_slice(bytes);
    Ok(1 + bytes.len())
}

fn decode_peer_id(buf: &[u8]) -> CodecResult<(ArrayStr<PEERID_SIZE>, usize)> {
    let len = *buf.first().ok_or(CodecError::Truncated)? as usize;
    if buf.len() < 1 + len {
        return Err(CodecError::Truncated);
    }
    let s = std::str::from_utf8(&buf[1..1 + len]).map_err(|_| CodecError::Overflow)?;
    Ok((ArrayStr::from_str_truncate(s), 1 + len))
}

/// `OPEN`: the client's own peer id plus the lease (in milliseconds) it is
/// requesting (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMessage {
    pub peer_id: ArrayStr<PEERID_SIZE>,
    pub lease_millis: u32,
}

impl OpenMessage {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.is_empty() {
            return Err(CodecError::NoSpace);
        }
        buf[0] = header_byte(MessageKind::Open, 0);
        let mut n = 1;
        n += encode_peer_id(&mut buf[n..], &self.peer_id)?;
        n += vle_encode(&mut buf[n..], self.lease_millis)?;
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.is_empty() {
            return Err(CodecError::Truncated);
        }
        let mut n = 1;
        let (peer_id, used) = decode_peer_id(&buf[n..])?;
        n += used;
        let (lease_millis, used) = vle_decode(&buf[n..])?;
        n += used;
        Ok((Self { peer_id, lease_millis }, n))
    }
}

/// `ACCEPT`: echoes the opener's peer id, carries the broker's own id, and
/// grants the lease actually in force for this session (which may differ
/// from what `OPEN` requested).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptMessage {
    pub peer_id: ArrayStr<PEERID_SIZE>,
    pub broker_id: ArrayStr<PEERID_SIZE>,
    pub lease_millis: u32,
}

impl AcceptMessage {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.is_empty() {
            return Err(CodecError::NoSpace);
        }
        buf[0] = header_byte(MessageKind::Accept, 0);
        let mut n = 1;
        n += encode_peer_id(&mut buf[n..], &self.peer_id)?;
        n += encode_peer_id(&mut buf[n..], &self.broker_id)?;
        n += vle_encode(&mut buf[n..], self.lease_millis)?;
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.is_empty() {
            return Err(CodecError::Truncated);
        }
        let mut n = 1;
        let (peer_id, used) = decode_peer_id(&buf[n..])?;
        n += used;
        let (broker_id, used) = decode_peer_id(&buf[n..])?;
        n += used;
        let (lease_millis, used) = vle_decode(&buf[n..])?;
        n += used;
        Ok((Self { peer_id, broker_id, lease_millis }, n))
    }
}

/// `DECLARE`'s own header: a sequence number (administrative only in this
/// build — declare traffic is sent directly rather than through the
/// retained/retransmitted `OutgoingConduit` ring, see `Engine`'s module
/// docs) and the number of [`Declaration`]s that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclareHeader {
    pub seq: SeqNum,
    pub count: u16,
}

impl DeclareHeader {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        if buf.is_empty() {
            return Err(CodecError::NoSpace);
        }
        buf[0] = header_byte(MessageKind::Declare, flags::RELIABLE);
        let mut n = 1;
        n += vle_encode(&mut buf[n..], self.seq.0)?;
        n += vle_encode(&mut buf[n..], self.count as u32)?;
        Ok(n)
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        if buf.is_empty() {
            return Err(CodecError::Truncated);
        }
        let mut n = 1;
        let (seq, used) = vle_decode(&buf[n..])?;
        n += used;
        let (count, used) = vle_decode(&buf[n..])?;
        n += used;
        Ok((Self { seq: SeqNum(seq), count: count as u16 }, n))
    }
}

/// One declaration inside a `DECLARE` body (§4.5). `Commit` and `Result`
/// carry no resource at all; `Subscriber` and `Publisher` each name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    Subscriber { rid: ResId, mode: u8 },
    Publisher { rid: ResId, reliable: bool },
    Commit { commit_id: u8 },
    Result { commit_id: u8, status: u8, rid: Option<ResId> },
}

impl Declaration {
    pub fn encode(&self, buf: &mut [u8]) -> CodecResult<usize> {
        match *self {
            Declaration::Subscriber { rid, mode } => {
                if buf.len() < 2 {
                    return Err(CodecError::NoSpace);
                }
                buf[0] = DeclKind::Subscriber as u8;
                let mut n = 1;
                n += vle_encode(&mut buf[n..], rid.get())?;
                if n >= buf.len() {
                    return Err(CodecError::NoSpace);
                }
                buf[n] = mode;
                Ok(n + 1)
            }
            Declaration::Publisher { rid, reliable } => {
                if buf.len() < 2 {
                    return Err(CodecError::NoSpace);
                }
                buf[0] = DeclKind::Publisher as u8;
                let mut n = 1;
                n += vle_encode(&mut buf[n..], rid.get())?;
                if n >= buf.len() {
                    return Err(CodecError::NoSpace);
                }
                buf[n] = reliable as u8;
                Ok(n + 1)
            }
            Declaration::Commit { commit_id } => {
                if buf.len() < 2 {
                    return Err(CodecError::NoSpace);
                }
                buf[0] = DeclKind::Commit as u8;
                buf[1] = commit_id;
                Ok(2)
            }
            Declaration::Result { commit_id, status, rid } => {
                if buf.len() < 3 {
                    return Err(CodecError::NoSpace);
                }
                buf[0] = DeclKind::Result as u8;
                buf[1] = commit_id;
                buf[2] = status;
                let mut n = 3;
                n += vle_encode(&mut buf[n..], rid.map_or(0, ResId::get))?;
                Ok(n)
            }
        }
    }

    pub fn decode(buf: &[u8]) -> CodecResult<(Self, usize)> {
        let kind = *buf.first().ok_or(CodecError::Truncated)?;
        match DeclKind::from_byte(kind) {
            Some(DeclKind::Subscriber) => {
                let (raw, used) = vle_decode(&buf[1..])?;
                let mut n = 1 + used;
                let mode = *buf.get(n).ok_or(CodecError::Truncated)?;
                n += 1;
                let rid = ResId::new(raw).ok_or(CodecError::Overflow)?;
                Ok((Declaration::Subscriber { rid, mode }, n))
            }
            Some(DeclKind::Publisher) => {
                let (raw, used) = vle_decode(&buf[1..])?;
                let mut n = 1 + used;
                let reliable = *buf.get(n).ok_or(CodecError::Truncated)? != 0;
                n += 1;
                let rid = ResId::new(raw).ok_or(CodecError::Overflow)?;
                Ok((Declaration::Publisher { rid, reliable }, n))
            }
            Some(DeclKind::Commit) => {
                let commit_id = *buf.get(1).ok_or(CodecError::Truncated)?;
                Ok((Declaration::Commit { commit_id }, 2))
            }
            Some(DeclKind::Result) => {
                if buf.len() < 3 {
                    return Err(CodecError::Truncated);
                }
                let commit_id = buf[1];
                let status = buf[2];
                let (raw, used) = vle_decode(&buf[3..])?;
                Ok((Declaration::Result { commit_id, status, rid: ResId::new(raw) }, 3 + used))
            }
            _ => Err(CodecError::Overflow),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdata_reliable_roundtrip_carries_seq() {
        let msg = SdataHeader { reliable: true, synch: false, rid: ResId::new(42).unwrap(), seq: SeqNum(160) };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        let (decoded, used) = SdataHeader::decode(&buf).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn sdata_unreliable_still_carries_a_seq() {
        let msg = SdataHeader { reliable: false, synch: false, rid: ResId::new(7).unwrap(), seq: SeqNum(48) };
        let mut buf = [0u8; 16];
        msg.encode(&mut buf).unwrap();
        let (decoded, _) = SdataHeader::decode(&buf).unwrap();
        assert_eq!(decoded.seq, SeqNum(48));
        assert!(!decoded.reliable);
    }

    #[test]
    fn sdata_synch_flag_is_independent_of_reliable() {
        let msg = SdataHeader { reliable: true, synch: true, rid: ResId::new(1).unwrap(), seq: SeqNum(0) };
        let mut buf = [0u8; 16];
        msg.encode(&mut buf).unwrap();
        let (decoded, _) = SdataHeader::decode(&buf).unwrap();
        assert!(decoded.synch);
        assert!(decoded.reliable);
    }

    #[test]
    fn synch_roundtrip() {
        let msg = SynchMessage { conduit: 3, seqbase: SeqNum(64), count: 5 };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        let (decoded, used) = SynchMessage::decode(&buf).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn acknack_roundtrip_with_mask() {
        let msg = AckNackMessage { conduit: 0, base: SeqNum(16), mask: 0b1010, mask_len: 4 };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        let (decoded, used) = AckNackMessage::decode(&buf).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn acknack_with_nothing_missing_omits_the_mask_entirely() {
        let msg = AckNackMessage { conduit: 0, base: SeqNum(32), mask: 0, mask_len: 0 };
        let mut buf = [0u8; 16];
        let n = msg.encode(&mut buf).unwrap();
        assert_eq!(n, 2 + vle_len(32));
        let (decoded, used) = AckNackMessage::decode(&buf).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn message_kind_round_trips_through_header_byte() {
        let header = header_byte(MessageKind::Declare, flags::RELIABLE);
        assert_eq!(MessageKind::from_byte(header), Some(MessageKind::Declare));
    }

    #[test]
    fn decl_kind_round_trips() {
        for kind in [
            DeclKind::Resource,
            DeclKind::Publisher,
            DeclKind::Subscriber,
            DeclKind::Selection,
            DeclKind::BindId,
            DeclKind::Commit,
            DeclKind::Result,
            DeclKind::DeleteRes,
        ] {
            assert_eq!(DeclKind::from_byte(kind as u8), Some(kind));
        }
    }

    #[test]
    fn scout_hello_roundtrip() {
        let scout = ScoutMessage { mask: scout_mask::BROKER };
        let mut buf = [0u8; 4];
        let n = scout.encode(&mut buf).unwrap();
        assert_eq!(ScoutMessage::decode(&buf[..n]).unwrap().0, scout);

        let hello = HelloMessage { mask: scout_mask::BROKER };
        let n = hello.encode(&mut buf).unwrap();
        assert_eq!(HelloMessage::decode(&buf[..n]).unwrap().0, hello);
    }

    #[test]
    fn open_accept_roundtrip() {
        let open = OpenMessage { peer_id: ArrayStr::from_str_truncate("client-1"), lease_millis: 10_000 };
        let mut buf = [0u8; 64];
        let n = open.encode(&mut buf).unwrap();
        let (decoded, used) = OpenMessage::decode(&buf[..n]).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, open);

        let accept = AcceptMessage {
            peer_id: ArrayStr::from_str_truncate("client-1"),
            broker_id: ArrayStr::from_str_truncate("broker-9"),
            lease_millis: 8_000,
        };
        let n = accept.encode(&mut buf).unwrap();
        let (decoded, used) = AcceptMessage::decode(&buf[..n]).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, accept);
    }

    #[test]
    fn declare_header_and_declaration_roundtrip() {
        let header = DeclareHeader { seq: SeqNum(32), count: 2 };
        let mut buf = [0u8; 32];
        let n = header.encode(&mut buf).unwrap();
        let (decoded, used) = DeclareHeader::decode(&buf[..n]).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, header);

        let decl = Declaration::Subscriber { rid: ResId::new(5).unwrap(), mode: decl_mode::PUSH };
        let mut buf = [0u8; 16];
        let n = decl.encode(&mut buf).unwrap();
        let (decoded, used) = Declaration::decode(&buf[..n]).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, decl);
    }

    #[test]
    fn result_declaration_with_no_rid_roundtrips() {
        let decl = Declaration::Result { commit_id: 1, status: dresult_reason::UNKNOWN_RID, rid: None };
        let mut buf = [0u8; 16];
        let n = decl.encode(&mut buf).unwrap();
        let (decoded, used) = Declaration::decode(&buf[..n]).unwrap();
        assert_eq!(used, n);
        assert_eq!(decoded, decl);
    }
}
