use std::net::{SocketAddr, UdpSocket};

use crate::{Transport, TransportError, TransportResult};

/// PACKET-mode transport: each `recv` yields exactly one complete datagram, matching
/// UDP's own framing, so the engine never needs to reassemble.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: SocketAddr) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::from)
    }
}

impl Transport for UdpTransport {
    type Addr = SocketAddr;

    fn send(&mut self, buf: &[u8], dst: &SocketAddr) -> TransportResult<usize> {
        Ok(self.socket.send_to(buf, dst)?)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> TransportResult<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((n, src)) => Ok(Some((n, src))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn addr_to_string(&self, addr: &SocketAddr) -> String {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trip() {
        let mut a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b_addr = b.local_addr().unwrap();
        let a_addr = a.local_addr().unwrap();

        a.send(b"hello", &b_addr).unwrap();

        // Non-blocking: give the loopback stack a moment.
        let mut buf = [0u8; 64];
        let mut got = None;
        for _ in 0..1000 {
            if let Some((n, src)) = b.try_recv(&mut buf).unwrap() {
                got = Some((n, src));
                break;
            }
        }
        let (n, src) = got.expect("expected a datagram");
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(src, a_addr);
    }

    #[test]
    fn try_recv_with_no_data_returns_none() {
        let mut a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut buf = [0u8; 16];
        assert!(a.try_recv(&mut buf).unwrap().is_none());
    }
}
