//! Per-socket state machine: READING -> PROCESSING -> WRITING ->
//! (keep-alive) READING | CLOSED (spec §3 "Connection", §4.5).
//!
//! Trimmed from the teacher's `HttpConnection` (`src/http/http_connection.rs`):
//! the CGI/upload `ActiveAction` variants, multipart boundary tracking and
//! session id are gone, but the `closed`-flag close-exactly-once discipline
//! (REDESIGN FLAG) and the bounded read/write loop shape survive.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Instant;

use mio::net::TcpStream;

use crate::buffer::Buffer;
use crate::error::{CoreError, Result};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

/// 8 read syscalls of up to 64 KiB each per reactor turn (spec §9
/// "Cooperative I/O bounds").
const MAX_READ_ITERATIONS: usize = 8;
/// 2 writev calls of up to 4 MiB each per reactor turn.
const MAX_WRITE_ITERATIONS: usize = 2;
const MAX_WRITE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reading,
    Processing,
    Writing,
    Closed,
}

pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub conn_id: u64,
    pub phase: Phase,
    pub read_buf: Buffer,
    pub write_buf: Buffer,
    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
    pub last_activity: Instant,
    /// Set once a PROCESSING-phase job has been submitted to the worker
    /// pool, so a connection whose readiness fires again before the job
    /// completes isn't dispatched a second time.
    pub dispatched: bool,
    closed: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, conn_id: u64) -> Self {
        Self {
            stream,
            peer_addr,
            conn_id,
            phase: Phase::Reading,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
            request: HttpRequest::new(),
            response: None,
            last_activity: Instant::now(),
            dispatched: false,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// State transition, not a `Drop` side effect (REDESIGN FLAG
    /// "Close-exactly-once"): callers call this exactly once, from the
    /// registry's removal path. Calling it twice is a programming error.
    pub fn close(&mut self) {
        assert!(!self.closed, "Connection::close called twice on conn_id {}", self.conn_id);
        self.closed = true;
        self.phase = Phase::Closed;
    }

    /// Drain the socket into `read_buf` up to the cooperative bound,
    /// stopping early on `WouldBlock` (readiness exhausted) or peer close.
    /// Returns `true` if the peer closed its write half.
    pub fn drain_readable(&mut self) -> Result<bool> {
        for _ in 0..MAX_READ_ITERATIONS {
            match self.read_buf.read_from_fd(&mut self.stream) {
                Ok((0, true)) => return Ok(true),
                Ok((0, false)) => return Ok(false),
                Ok(_) => {
                    self.last_activity = Instant::now();
                    continue;
                }
                Err(e) => return Err(CoreError::Transport(e)),
            }
        }
        Ok(false)
    }

    /// Feed buffered bytes into the request parser. Returns `true` once a
    /// full request has been parsed.
    pub fn advance_parse(&mut self) -> Result<bool> {
        self.request.parse(&mut self.read_buf).map_err(CoreError::from)
    }

    /// Flush `write_buf` (headers) then the response body, up to the
    /// cooperative write bound. Returns `true` once everything queued has
    /// been written.
    pub fn drain_writable(&mut self) -> Result<bool> {
        let mut written_total = 0usize;
        for _ in 0..MAX_WRITE_ITERATIONS {
            if self.write_buf.is_empty() {
                return Ok(true);
            }
            match self.write_buf.write_to_fd(&mut self.stream) {
                Ok(0) => return Ok(self.write_buf.is_empty()),
                Ok(n) => {
                    written_total += n;
                    self.last_activity = Instant::now();
                    if written_total >= MAX_WRITE_BYTES {
                        return Ok(false);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(CoreError::Transport(e)),
            }
        }
        Ok(self.write_buf.is_empty())
    }

    /// Queue a response for writing: header bytes then body bytes, both
    /// pushed into the single write buffer (the reactor's `writev` of
    /// header-bytes-plus-mmap-span is modeled at this layer as two
    /// `append`s rather than a literal two-element `iovec`, since the
    /// buffer already owns a contiguous span for the headers).
    pub fn queue_response(&mut self, response: HttpResponse) {
        self.write_buf.append(&response.header_bytes());
        self.write_buf.append(response.body.bytes());
        self.response = Some(response);
        self.dispatched = false;
        self.phase = Phase::Writing;
    }

    /// Reset parser and phase for the next request on a keep-alive
    /// connection (spec §8).
    pub fn prepare_for_next_request(&mut self) {
        self.request.reset();
        self.response = None;
        self.dispatched = false;
        self.phase = Phase::Reading;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug_assert!(self.closed, "Connection dropped without close() on conn_id {}", self.conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener as StdTcpListener;

    fn connected_pair() -> (Connection, std::net::TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server_std, peer_addr) = listener.accept().unwrap();
        server_std.set_nonblocking(true).unwrap();
        let conn = Connection::new(TcpStream::from_std(server_std), peer_addr, 1);
        (conn, client)
    }

    #[test]
    #[should_panic(expected = "called twice")]
    fn close_called_twice_panics() {
        let (mut conn, _client) = connected_pair();
        conn.close();
        conn.close();
    }

    #[test]
    fn drain_readable_parses_a_full_request_across_two_writes() {
        let (mut conn, mut client) = connected_pair();
        client.write_all(b"GET / HTTP/1.1\r\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(!conn.drain_readable().unwrap());
        assert!(!conn.advance_parse().unwrap());

        client.write_all(b"Host: x\r\n\r\n").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(!conn.drain_readable().unwrap());
        assert!(conn.advance_parse().unwrap());
        assert_eq!(conn.request.path, "/index.html");

        conn.close();
    }

    #[test]
    fn peer_shutdown_is_reported_as_closed() {
        let (mut conn, client) = connected_pair();
        drop(client);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(conn.drain_readable().unwrap());
        conn.close();
    }
}
