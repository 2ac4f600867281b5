//! Push server: accepts UI-client connections, authorizes them
//! against an IPv4 allowlist, and multiplexes reads/writes across many
//! client sockets without blocking the reactor.

pub mod protocol;

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use anyhow::{Context, Result};
use mio::net::{TcpListener, TcpStream};
use mio::Token;

use protocol::{
    apply_verb, parse_command, response_line, unknown_response_line, ClientOptions, Verb,
};

pub const SERVER_TOKEN: Token = Token(0);
const HIGH_WATER_MARK: usize = 64 * 1024;

pub struct ClientConn {
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub options: ClientOptions,
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
    pub closed: bool,
}

impl ClientConn {
    fn enqueue(&mut self, line: &str) {
        if self.closed {
            return;
        }
        self.send_buf.extend_from_slice(line.as_bytes());
        if self.send_buf.len() > HIGH_WATER_MARK {
            self.closed = true;
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.send_buf.is_empty() {
            return Ok(());
        }
        match self.stream.write(&self.send_buf) {
            Ok(0) => self.closed = true,
            Ok(n) => {
                self.send_buf.drain(..n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(_) => self.closed = true,
        }
        Ok(())
    }
}

pub struct PushServer {
    listener: TcpListener,
    allowed: Vec<Ipv4Addr>,
    max_clients: usize,
    clients: HashMap<Token, ClientConn>,
    next_token: usize,
}

impl PushServer {
    /// Bind and listen, parsing `allowed_csv` as a comma-separated list
    /// of exact-match IPv4 addresses.
    pub fn setup(addr: SocketAddr, max_clients: usize, allowed_csv: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).with_context(|| format!("binding push server to {addr}"))?;
        let allowed = allowed_csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Ipv4Addr::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("parsing allowed-hosts list")?;
        Ok(Self {
            listener,
            allowed,
            max_clients,
            clients: HashMap::new(),
            next_token: 1,
        })
    }

    pub fn listener_mut(&mut self) -> &mut TcpListener {
        &mut self.listener
    }

    pub fn client_stream_mut(&mut self, token: Token) -> Option<&mut TcpStream> {
        self.clients.get_mut(&token).map(|c| &mut c.stream)
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.clients.keys().copied().collect()
    }

    fn is_allowed(&self, addr: &SocketAddr) -> bool {
        match addr {
            SocketAddr::V4(v4) => self.allowed.iter().any(|a| a == v4.ip()),
            SocketAddr::V6(_) => false,
        }
    }

    /// Accept every pending connection. Addresses not on the allowlist
    /// are closed immediately without ever being registered; accepted
    /// clients are returned so the caller can register them with the
    /// reactor and send the greeting.
    pub fn accept_ready(&mut self) -> Result<Vec<Token>> {
        let mut accepted = Vec::new();
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if !self.is_allowed(&addr) || self.clients.len() >= self.max_clients {
                        drop(stream);
                        continue;
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.clients.insert(
                        token,
                        ClientConn {
                            stream,
                            addr,
                            options: ClientOptions::default(),
                            recv_buf: Vec::new(),
                            send_buf: Vec::new(),
                            closed: false,
                        },
                    );
                    accepted.push(token);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(accepted)
    }

    /// Read from a readable client, split complete lines out of its
    /// buffer, and apply each one. Returns any `pause`/`resume`
    /// requests for the caller to act on against the capture source.
    pub fn handle_readable(&mut self, token: Token) -> Result<Vec<Verb>> {
        let mut pending = Vec::new();
        let Some(client) = self.clients.get_mut(&token) else {
            return Ok(pending);
        };
        let mut buf = [0u8; 4096];
        loop {
            match client.stream.read(&mut buf) {
                Ok(0) => {
                    client.closed = true;
                    break;
                }
                Ok(n) => client.recv_buf.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => {
                    client.closed = true;
                    break;
                }
            }
        }

        while let Some(pos) = client.recv_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = client.recv_buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            match parse_command(&line) {
                Ok(cmd) => {
                    let control = apply_verb(cmd.verb, &mut client.options);
                    if let Some(resp) = response_line(cmd.stamp, true) {
                        client.enqueue(&resp);
                    }
                    if control {
                        pending.push(cmd.verb);
                    }
                }
                Err(_) => {
                    if let Some(resp) = unknown_response_line(stamp_of(&line)) {
                        client.enqueue(&resp);
                    }
                }
            }
        }
        Ok(pending)
    }

    pub fn send(&mut self, token: Token, line: &str) {
        if let Some(client) = self.clients.get_mut(&token) {
            client.enqueue(line);
        }
    }

    pub fn send_to_all(&mut self, line: &str) {
        for client in self.clients.values_mut() {
            client.enqueue(line);
        }
    }

    pub fn send_to_all_opts(&mut self, line: &str, mask: ClientOptions) {
        for client in self.clients.values_mut() {
            if client.options.matches(mask) {
                client.enqueue(line);
            }
        }
    }

    pub fn get_client_opts(&self, token: Token) -> Option<ClientOptions> {
        self.clients.get(&token).map(|c| c.options)
    }

    pub fn set_client_opts(&mut self, token: Token, opts: ClientOptions) {
        if let Some(client) = self.clients.get_mut(&token) {
            client.options = opts;
        }
    }

    /// Flush as much buffered output as the socket will currently take
    /// for every client, closing any client whose buffer exceeded the
    /// high-water mark or whose socket errored.
    pub fn flush_writes(&mut self) -> Result<()> {
        for client in self.clients.values_mut() {
            client.flush()?;
        }
        Ok(())
    }

    /// Remove and return the tokens of every client marked closed, so
    /// the caller can deregister them from the reactor.
    pub fn reap_closed(&mut self) -> Vec<Token> {
        let dead: Vec<Token> = self
            .clients
            .iter()
            .filter(|(_, c)| c.closed)
            .map(|(t, _)| *t)
            .collect();
        for token in &dead {
            self.clients.remove(token);
        }
        dead
    }

    /// Broadcast `*TERMINATE`, flush it out, then drop every client.
    pub fn shutdown(&mut self) -> Result<()> {
        self.send_to_all("*TERMINATE Kismet server shutting down\n");
        self.flush_writes()?;
        self.clients.clear();
        Ok(())
    }
}

fn stamp_of(line: &str) -> u64 {
    line.trim()
        .strip_prefix('!')
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::TcpStream as StdTcpStream;
    use std::thread;
    use std::time::Duration;

    fn connect_loopback(server_addr: SocketAddr) -> StdTcpStream {
        for _ in 0..20 {
            if let Ok(s) = StdTcpStream::connect(server_addr) {
                return s;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("could not connect to push server");
    }

    #[test]
    fn allowlist_rejects_unlisted_address() {
        let mut server = PushServer::setup("127.0.0.1:0".parse().unwrap(), 8, "10.0.0.1").unwrap();
        let addr = server.listener.local_addr().unwrap();
        let mut client = connect_loopback(addr);
        thread::sleep(Duration::from_millis(20));

        let accepted = server.accept_ready().unwrap();
        assert!(accepted.is_empty());

        let mut buf = [0u8; 16];
        client.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let n = client.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[test]
    fn allowed_client_receives_broadcast_and_option_filtering_works() {
        let mut server = PushServer::setup("127.0.0.1:0".parse().unwrap(), 8, "127.0.0.1").unwrap();
        let addr = server.listener.local_addr().unwrap();
        let mut client = connect_loopback(addr);
        thread::sleep(Duration::from_millis(20));

        let accepted = server.accept_ready().unwrap();
        assert_eq!(accepted.len(), 1);
        let token = accepted[0];

        client.write_all(b"strings\n").unwrap();
        thread::sleep(Duration::from_millis(20));
        let control = server.handle_readable(token).unwrap();
        assert!(control.is_empty());
        assert_eq!(server.get_client_opts(token).unwrap().send_strings, 1);

        let mask = ClientOptions {
            send_strings: 1,
            send_packtype: -1,
        };
        server.send_to_all_opts("*STRING hello\n", mask);
        server.flush_writes().unwrap();

        let mut buf = [0u8; 64];
        client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"*STRING hello\n");
    }

    #[test]
    fn stamped_pause_command_gets_ok_response_and_is_reported() {
        let mut server = PushServer::setup("127.0.0.1:0".parse().unwrap(), 8, "127.0.0.1").unwrap();
        let addr = server.listener.local_addr().unwrap();
        let mut client = connect_loopback(addr);
        thread::sleep(Duration::from_millis(20));
        let token = server.accept_ready().unwrap()[0];

        client.write_all(b"!9 pause\n").unwrap();
        thread::sleep(Duration::from_millis(20));
        let control = server.handle_readable(token).unwrap();
        assert_eq!(control, vec![Verb::Pause]);

        server.flush_writes().unwrap();
        let mut buf = [0u8; 32];
        client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"!9 ok\n");
    }
}
