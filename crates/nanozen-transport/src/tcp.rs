use std::{
    collections::{HashMap, VecDeque},
    io::{self, Read, Write},
    net::SocketAddr,
    time::Duration,
};

use mio::{Events, Interest, Poll, Token, net::TcpListener, net::TcpStream};

use crate::{Transport, TransportError, TransportResult};

const EVENT_CAPACITY: usize = 128;

/// STREAM-mode transport: `try_recv` hands back whatever bytes a readable peer has
/// available right now, with no framing of its own — the engine reassembles packets
/// from the fragments (§6). Sends that would block are queued on a per-peer backlog
/// and retried on the next `poll`, the way the teacher's non-blocking stream layer
/// keeps `send` "non-blocking or succeed promptly" without an explicit write call
/// ever blocking the caller.
pub struct TcpTransport {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    listener_token: Token,
    conns: HashMap<Token, Conn>,
    addr_to_token: HashMap<SocketAddr, Token>,
    next_token: usize,
    pending: VecDeque<(SocketAddr, Vec<u8>)>,
}

struct Conn {
    stream: TcpStream,
    addr: SocketAddr,
    backlog: VecDeque<Vec<u8>>,
    writable_registered: bool,
}

impl TcpTransport {
    pub fn new() -> TransportResult<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener: None,
            listener_token: Token(0),
            conns: HashMap::new(),
            addr_to_token: HashMap::new(),
            next_token: 1,
            pending: VecDeque::new(),
        })
    }

    pub fn listen(&mut self, addr: SocketAddr) -> TransportResult<()> {
        let mut listener = TcpListener::bind(addr)?;
        self.poll.registry().register(&mut listener, self.listener_token, Interest::READABLE)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Opens a connection to `addr` for client-mode operation against a single
    /// broker; the resulting peer address can then be used with `send`.
    pub fn connect(&mut self, addr: SocketAddr) -> TransportResult<()> {
        let mut stream = TcpStream::connect(addr)?;
        let token = self.alloc_token();
        self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        self.addr_to_token.insert(addr, token);
        self.conns.insert(token, Conn { stream, addr, backlog: VecDeque::new(), writable_registered: true });
        Ok(())
    }

    fn alloc_token(&mut self) -> Token {
        let t = Token(self.next_token);
        self.next_token += 1;
        t
    }

    fn accept_all(&mut self) -> TransportResult<()> {
        loop {
            let Some(listener) = self.listener.as_ref() else { return Ok(()) };
            match listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = self.alloc_token();
                    self.poll.registry().register(&mut stream, token, Interest::READABLE)?;
                    self.addr_to_token.insert(addr, token);
                    self.conns.insert(
                        token,
                        Conn { stream, addr, backlog: VecDeque::new(), writable_registered: false },
                    );
                    tracing::debug!(%addr, "accepted inbound peer connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn drain_backlog(conn: &mut Conn) -> TransportResult<()> {
        while let Some(front) = conn.backlog.front_mut() {
            match conn.stream.write(front) {
                Ok(n) if n == front.len() => {
                    conn.backlog.pop_front();
                }
                Ok(n) => {
                    front.drain(..n);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn poll_once(&mut self) -> TransportResult<()> {
        self.poll.poll(&mut self.events, Some(Duration::from_millis(0)))?;
        let mut readable_tokens = Vec::new();
        let mut writable_tokens = Vec::new();
        for event in self.events.iter() {
            if event.token() == self.listener_token {
                continue;
            }
            if event.is_readable() {
                readable_tokens.push(event.token());
            }
            if event.is_writable() {
                writable_tokens.push(event.token());
            }
        }
        let saw_listener_event = self.events.iter().any(|e| e.token() == self.listener_token);
        if saw_listener_event {
            self.accept_all()?;
        }

        for token in writable_tokens {
            if let Some(conn) = self.conns.get_mut(&token) {
                Self::drain_backlog(conn)?;
            }
        }

        let mut dead = Vec::new();
        for token in readable_tokens {
            let Some(conn) = self.conns.get_mut(&token) else { continue };
            let mut buf = [0u8; 4096];
            loop {
                match conn.stream.read(&mut buf) {
                    Ok(0) => {
                        dead.push((token, conn.addr));
                        break;
                    }
                    Ok(n) => {
                        self.pending.push_back((conn.addr, buf[..n].to_vec()));
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(_) => {
                        dead.push((token, conn.addr));
                        break;
                    }
                }
            }
        }
        for (token, addr) in dead {
            self.conns.remove(&token);
            self.addr_to_token.remove(&addr);
            tracing::debug!(%addr, "peer connection closed");
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    type Addr = SocketAddr;

    fn send(&mut self, buf: &[u8], dst: &SocketAddr) -> TransportResult<usize> {
        let token = *self.addr_to_token.get(dst).ok_or(TransportError::Unbound)?;
        let conn = self.conns.get_mut(&token).ok_or(TransportError::Unbound)?;
        if !conn.backlog.is_empty() {
            conn.backlog.push_back(buf.to_vec());
            return Ok(buf.len());
        }
        match conn.stream.write(buf) {
            Ok(n) if n == buf.len() => Ok(n),
            Ok(n) => {
                conn.backlog.push_back(buf[n..].to_vec());
                Ok(buf.len())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                conn.backlog.push_back(buf.to_vec());
                Ok(buf.len())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> TransportResult<Option<(usize, SocketAddr)>> {
        if self.pending.is_empty() {
            self.poll_once()?;
        }
        let Some((addr, bytes)) = self.pending.pop_front() else { return Ok(None) };
        if bytes.len() > buf.len() {
            return Err(TransportError::Oversized { len: bytes.len(), cap: buf.len() });
        }
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(Some((bytes.len(), addr)))
    }

    fn addr_to_string(&self, addr: &SocketAddr) -> String {
        addr.to_string()
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new().expect("mio::Poll::new should not fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_send_recv_round_trip() {
        let mut server = TcpTransport::new().unwrap();
        server.listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = server.listener.as_ref().unwrap().local_addr().unwrap();

        let mut client = TcpTransport::new().unwrap();
        client.connect(server_addr).unwrap();

        // Give the server time to accept the connection before sending.
        let mut accepted = false;
        for _ in 0..2000 {
            server.poll_once().unwrap();
            if !server.conns.is_empty() {
                accepted = true;
                break;
            }
        }
        assert!(accepted, "server never accepted the client connection");

        client.send(b"hi", &server_addr).unwrap();

        let mut buf = [0u8; 64];
        let mut got = None;
        for _ in 0..2000 {
            if let Some((n, _)) = server.try_recv(&mut buf).unwrap() {
                got = Some(n);
                break;
            }
        }
        let n = got.expect("expected bytes from client");
        assert_eq!(&buf[..n], b"hi");
    }
}
