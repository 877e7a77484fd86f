//! A non-blocking TCP connection with line-granular buffering.
//!
//! Reads gather bytes until newline terminators and hand out only complete
//! lines; writes flush up to the last complete line boundary and keep the
//! remainder buffered. "Would block" is swallowed on both paths. Any other
//! I/O fault marks the connection as faulted: the socket is never reused and
//! [`Connection::reset`] must be called before the next connect attempt.

use std::io::{self, Read, Write};
use std::net::Shutdown;

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{is_transient, ConnectionError, Result};
use crate::tcp;

/// Bytes read from the socket per call.
const READ_CHUNK: usize = 4096;

/// Outcome of a non-blocking connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectProgress {
    /// The socket is connected.
    Connected,
    /// The handshake is still in progress; retry when the socket is writable.
    Pending,
}

/// A non-blocking, line-buffered TCP connection.
pub struct Connection {
    stream: Option<TcpStream>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    connected: bool,
    faulted: bool,
}

impl Connection {
    /// Create an unconnected connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream: None,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            connected: false,
            faulted: false,
        }
    }

    /// Check if the socket is connected.
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.connected
    }

    /// Bytes waiting in the write buffer.
    #[must_use]
    pub fn pending_write_len(&self) -> usize {
        self.write_buf.len()
    }

    /// Discard both buffers and replace the socket.
    ///
    /// This is the only way out of the faulted state; a faulted socket is
    /// never reused.
    pub fn reset(&mut self) {
        self.stream = None;
        self.read_buf.clear();
        self.write_buf.clear();
        self.connected = false;
        self.faulted = false;
    }

    /// Start or advance a non-blocking connect.
    ///
    /// The first call initiates the handshake and reports
    /// [`ConnectProgress::Pending`]; later calls (typically driven by write
    /// readiness) check progress and report [`ConnectProgress::Connected`]
    /// once the handshake finished. Calling on an already connected socket
    /// is a no-op success.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::RequiresReset`] if a previous fault was never
    /// reset; any handshake failure is returned as a fatal error.
    pub fn connect(&mut self, endpoint: &Endpoint) -> Result<ConnectProgress> {
        if self.faulted {
            return Err(ConnectionError::RequiresReset);
        }
        if self.connected {
            return Ok(ConnectProgress::Connected);
        }

        let Some(stream) = self.stream.as_ref() else {
            let addr = match endpoint.resolve() {
                Ok(addr) => addr,
                Err(e) => return Err(self.fault(e.into())),
            };
            let stream = match TcpStream::connect(addr) {
                Ok(stream) => stream,
                Err(e) => return Err(self.fault(e.into())),
            };
            debug!(%endpoint, "connect initiated");
            self.stream = Some(stream);
            return Ok(ConnectProgress::Pending);
        };

        // Probe handshake progress with the socket borrowed immutably, then
        // apply state changes.
        let probe = match stream.take_error() {
            Ok(Some(err)) | Err(err) => Err(err),
            Ok(None) => match stream.peer_addr() {
                Ok(_) => {
                    let _ = tcp::configure_stream(stream);
                    Ok(true)
                }
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
                Err(e) if is_transient(e.kind()) => Ok(false),
                Err(e) => Err(e),
            },
        };

        match probe {
            Ok(true) => {
                self.connected = true;
                debug!(%endpoint, "connected");
                Ok(ConnectProgress::Connected)
            }
            Ok(false) => Ok(ConnectProgress::Pending),
            Err(e) => Err(self.fault(e.into())),
        }
    }

    /// Close the socket. Idempotent; always leaves the connection
    /// disconnected.
    pub fn disconnect(&mut self) {
        self.connected = false;

        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Drain currently available bytes and return newly complete lines.
    ///
    /// Lines keep their terminator. A trailing partial line stays buffered
    /// until its terminator arrives. "Nothing to read" yields an empty list.
    ///
    /// # Errors
    ///
    /// EOF and any non-transient I/O error are fatal: the connection is
    /// marked disconnected and faulted.
    pub fn read(&mut self) -> Result<Vec<String>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Vec::new());
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(self.fault(ConnectionError::ClosedByPeer));
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fault(e.into())),
            }
        }

        Ok(self.take_complete_lines())
    }

    /// Append `payload` to the write buffer and flush up to the last
    /// complete line boundary.
    ///
    /// Returns the number of bytes actually flushed (and removed from the
    /// buffer); zero when the socket is not ready or no complete line is
    /// buffered yet. Call with an empty payload to retry flushing.
    ///
    /// # Errors
    ///
    /// Any non-transient I/O error is fatal: the connection is marked
    /// disconnected and faulted.
    pub fn write(&mut self, payload: &str) -> Result<usize> {
        self.write_buf.extend_from_slice(payload.as_bytes());

        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };

        let Some(boundary) = self.write_buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(0);
        };

        match stream.write(&self.write_buf[..=boundary]) {
            Ok(n) => {
                self.write_buf.advance(n);
                Ok(n)
            }
            Err(e) if is_transient(e.kind()) => Ok(0),
            Err(e) => Err(self.fault(e.into())),
        }
    }

    /// Register the socket with a poll registry.
    ///
    /// Returns `false` when there is no socket to register.
    pub fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<bool> {
        match self.stream.as_mut() {
            Some(stream) => registry.register(stream, token, interests).map(|()| true),
            None => Ok(false),
        }
    }

    /// Re-register the socket, re-arming event delivery.
    pub fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<bool> {
        match self.stream.as_mut() {
            Some(stream) => registry.reregister(stream, token, interests).map(|()| true),
            None => Ok(false),
        }
    }

    /// Remove the socket from a poll registry.
    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => registry.deregister(stream),
            None => Ok(()),
        }
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(boundary) = self.read_buf.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete = self.read_buf.split_to(boundary + 1);
        String::from_utf8_lossy(&complete)
            .split_inclusive('\n')
            .map(str::to_owned)
            .collect()
    }

    fn fault(&mut self, error: ConnectionError) -> ConnectionError {
        self.connected = false;
        self.faulted = true;
        debug!(%error, "connection faulted");
        error
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.connected)
            .field("faulted", &self.faulted)
            .field("read_buffered", &self.read_buf.len())
            .field("write_buffered", &self.write_buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    fn listener() -> (TcpListener, Endpoint) {
        let port = portpicker::pick_unused_port().expect("no free port");
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    fn connect(conn: &mut Connection, endpoint: &Endpoint) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match conn.connect(endpoint).unwrap() {
                ConnectProgress::Connected => return,
                ConnectProgress::Pending => {
                    assert!(Instant::now() < deadline, "connect timed out");
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    #[test]
    fn starts_unconnected() {
        let conn = Connection::new();
        assert!(!conn.connected());
    }

    #[test]
    fn connects_and_disconnects() {
        let (listener, endpoint) = listener();
        let server = thread::spawn(move || listener.accept().unwrap().0);

        let mut conn = Connection::new();
        assert_eq!(conn.connect(&endpoint).unwrap(), ConnectProgress::Pending);
        connect(&mut conn, &endpoint);
        assert!(conn.connected());

        // Connecting again is a no-op success.
        assert_eq!(conn.connect(&endpoint).unwrap(), ConnectProgress::Connected);

        conn.disconnect();
        assert!(!conn.connected());
        conn.disconnect(); // idempotent

        server.join().unwrap();
    }

    #[test]
    fn reads_only_complete_lines() {
        let (listener, endpoint) = listener();
        let server = thread::spawn(move || listener.accept().unwrap().0);

        let mut conn = Connection::new();
        connect(&mut conn, &endpoint);
        let mut peer = server.join().unwrap();

        peer.write_all(b"hi\nho").unwrap();
        peer.flush().unwrap();

        let lines = read_until_lines(&mut conn);
        assert_eq!(lines, vec!["hi\n".to_string()]);

        peer.write_all(b"\n").unwrap();
        peer.flush().unwrap();

        let lines = read_until_lines(&mut conn);
        assert_eq!(lines, vec!["ho\n".to_string()]);
    }

    #[test]
    fn read_with_nothing_available_is_empty() {
        let (listener, endpoint) = listener();
        let server = thread::spawn(move || listener.accept().unwrap().0);

        let mut conn = Connection::new();
        connect(&mut conn, &endpoint);
        let _peer = server.join().unwrap();

        assert!(conn.read().unwrap().is_empty());
    }

    #[test]
    fn read_after_peer_close_is_fatal() {
        let (listener, endpoint) = listener();
        let server = thread::spawn(move || listener.accept().unwrap().0);

        let mut conn = Connection::new();
        connect(&mut conn, &endpoint);
        drop(server.join().unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        let error = loop {
            match conn.read() {
                Ok(_) => {
                    assert!(Instant::now() < deadline, "EOF never surfaced");
                    thread::sleep(Duration::from_millis(5));
                }
                Err(e) => break e,
            }
        };

        assert!(matches!(error, ConnectionError::ClosedByPeer));
        assert!(!conn.connected());

        // The faulted socket refuses further connects until reset.
        assert!(matches!(
            conn.connect(&endpoint),
            Err(ConnectionError::RequiresReset)
        ));
        conn.reset();
        assert!(!conn.connected());
    }

    #[test]
    fn write_flushes_only_complete_lines() {
        let (listener, endpoint) = listener();
        let server = thread::spawn(move || listener.accept().unwrap().0);

        let mut conn = Connection::new();
        connect(&mut conn, &endpoint);
        let mut peer = server.join().unwrap();

        assert_eq!(conn.write("par").unwrap(), 0);
        assert_eq!(conn.pending_write_len(), 3);

        let flushed = conn.write("tial\n").unwrap();
        assert_eq!(flushed, 8);
        assert_eq!(conn.pending_write_len(), 0);

        let mut received = vec![0u8; 8];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"partial\n");
    }

    fn read_until_lines(conn: &mut Connection) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let lines = conn.read().unwrap();
            if !lines.is_empty() {
                return lines;
            }
            assert!(Instant::now() < deadline, "no lines arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
