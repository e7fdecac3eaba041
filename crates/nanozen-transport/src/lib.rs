//! Concrete transports for the external "transport interface" the nanozen engine
//! consumes: `send`/`recv`/`addr_eq`/`addr_to_string`, in PACKET mode (one `recv`
//! yields one complete datagram) or STREAM mode (`recv` yields raw byte fragments
//! that the engine reassembles itself).

pub mod error;
pub mod loopback;
pub mod tcp;
pub mod udp;

use std::net::SocketAddr;

pub use error::{TransportError, TransportResult};

/// The transport interface consumed by the engine (§6). `Addr` stands in for the
/// opaque `zeno_address_t` of the source material; concrete transports use
/// `std::net::SocketAddr` directly since Rust already gives it `Eq` and `Display`.
pub trait Transport {
    type Addr: Copy + Eq + std::fmt::Debug;

    /// Sends `buf` to `dst`. A negative count in the source becomes `Err` here.
    fn send(&mut self, buf: &[u8], dst: &Self::Addr) -> TransportResult<usize>;

    /// Non-blocking receive. `Ok(None)` is "no data available right now" (the
    /// source's zero-return), never an error.
    fn try_recv(&mut self, buf: &mut [u8]) -> TransportResult<Option<(usize, Self::Addr)>>;

    fn addr_eq(&self, a: &Self::Addr, b: &Self::Addr) -> bool {
        a == b
    }

    fn addr_to_string(&self, addr: &Self::Addr) -> String;
}

/// Whether a transport delivers whole packets per `recv` (PACKET) or raw byte
/// fragments that must be reassembled by the caller (STREAM), per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Packet,
    Stream,
}

pub type Addr = SocketAddr;
