//! Growable read/write byte arena (spec §3 "Buffer", §4.1).
//!
//! Three offsets divide the backing storage: `read_pos <= write_pos <=
//! capacity`. `[read_pos, write_pos)` is the readable span, `[write_pos,
//! capacity)` is writable tail, and `read_pos` doubles as the prependable
//! count. Ported from the teacher's `Vec<u8>`-backed read/write buffers on
//! `Connection` (`src/http/connection.rs`'s `write_buffer` and the request
//! parser's `buffer`/`cursor` pair), generalized into the standalone type
//! `zener::Buffer` (`include/buffer/buffer.h`) already called for.

use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;

const INIT_CAPACITY: usize = 1024;
const SPILLOVER_SIZE: usize = 64 * 1024;

pub struct Buffer {
    storage: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(INIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable_bytes(&self) -> usize {
        self.storage.len() - self.write_pos
    }

    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// The unread span `[read_pos, write_pos)`.
    pub fn peek(&self) -> &[u8] {
        &self.storage[self.read_pos..self.write_pos]
    }

    /// Advance `read_pos` by `n`, clamped to the readable span. Resets both
    /// offsets to 0 once the buffer is fully drained, so repeated small
    /// consumes don't march `read_pos` forward forever.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.readable_bytes());
        self.read_pos += n;
        if self.read_pos == self.write_pos {
            self.reset();
        }
    }

    /// Consume up to (and including) the byte just before `end_offset`
    /// (an offset into the readable span, as returned by a line scan).
    pub fn consume_until(&mut self, end_offset: usize) {
        self.consume(end_offset - self.read_pos);
    }

    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    pub fn append(&mut self, data: &[u8]) {
        self.ensure_writable(data.len());
        let end = self.write_pos + data.len();
        self.storage[self.write_pos..end].copy_from_slice(data);
        self.write_pos = end;
    }

    /// See spec §3: if the writable tail is too small but
    /// `prependable + writable >= need`, shift the readable region down to
    /// offset 0 instead of growing; otherwise grow to `write_pos + need + 1`.
    fn ensure_writable(&mut self, need: usize) {
        if self.writable_bytes() >= need {
            return;
        }
        if self.prependable_bytes() + self.writable_bytes() >= need {
            let len = self.readable_bytes();
            self.storage.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = len;
        } else {
            self.storage.resize(self.write_pos + need + 1, 0);
        }
    }

    /// Scatter-read into the buffer's writable tail plus a stack-resident
    /// spillover, appending whatever didn't fit directly. Returns
    /// `(bytes_read, peer_closed)`; `EAGAIN`/`EWOULDBLOCK` is reported as
    /// `Ok((0, false))` so callers can distinguish it from peer close.
    pub fn read_from_fd<R: Read + AsRawFd>(&mut self, source: &mut R) -> io::Result<(usize, bool)> {
        let mut spillover = [0u8; SPILLOVER_SIZE];
        let writable = self.writable_bytes().max(1);

        // Two-part scatter read: tail of the buffer, then the spillover
        // stack buffer, mirroring `Buffer::ReadFd`'s `iovec[2]` readv.
        let tail_start = self.write_pos;
        self.storage.resize(self.storage.len().max(tail_start + writable), 0);

        let mut bufs = [
            io::IoSliceMut::new(&mut self.storage[tail_start..tail_start + writable]),
            io::IoSliceMut::new(&mut spillover),
        ];

        match read_vectored_nonblocking(source, &mut bufs) {
            Ok(0) => Ok((0, true)),
            Ok(n) => {
                if n <= writable {
                    self.write_pos += n;
                } else {
                    self.write_pos += writable;
                    self.append(&spillover[..n - writable]);
                }
                Ok((n, false))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok((0, false)),
            Err(e) => Err(e),
        }
    }

    /// Write the whole readable span once; does not loop on partial writes
    /// (the connection state machine owns retry/rearm policy).
    pub fn write_to_fd<W: Write>(&mut self, sink: &mut W) -> io::Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        match sink.write(self.peek()) {
            Ok(n) => {
                self.consume(n);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn read_vectored_nonblocking<R: Read>(source: &mut R, bufs: &mut [io::IoSliceMut<'_>]) -> io::Result<usize> {
    source.read_vectored(bufs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_advances_write_pos_only() {
        let mut buf = Buffer::new();
        buf.append(b"hello");
        assert_eq!(buf.readable_bytes(), 5);
        assert_eq!(buf.peek(), b"hello");
    }

    #[test]
    fn consume_advances_read_pos_and_resets_when_drained() {
        let mut buf = Buffer::new();
        buf.append(b"hello world");
        buf.consume(6);
        assert_eq!(buf.peek(), b"world");
        buf.consume(5);
        assert_eq!(buf.readable_bytes(), 0);
        // fully drained: both offsets reset to 0, not left dangling.
        buf.append(b"x");
        assert_eq!(buf.peek(), b"x");
    }

    #[test]
    fn growth_shifts_before_reallocating_when_there_is_prependable_slack() {
        let mut buf = Buffer::with_capacity(16);
        buf.append(b"0123456789");
        buf.consume(8);
        assert_eq!(buf.prependable_bytes(), 8);
        let cap_before = buf.storage.len();
        buf.append(b"abcdefgh");
        // 8 prependable + (16-10) writable = 14 >= 8 needed: shift, no growth.
        assert_eq!(buf.storage.len(), cap_before);
        assert_eq!(buf.peek(), b"89abcdefgh");
    }

    #[test]
    fn growth_reallocates_when_slack_is_insufficient() {
        let mut buf = Buffer::with_capacity(4);
        buf.append(b"ab");
        buf.append(b"cdefgh");
        assert!(buf.storage.len() >= buf.write_pos);
        assert_eq!(buf.peek(), b"abcdefgh");
    }

    #[test]
    fn invariant_read_pos_le_write_pos_le_capacity_holds() {
        let mut buf = Buffer::with_capacity(8);
        for chunk in [&b"ab"[..], b"cdefgh", b"ij"] {
            buf.append(chunk);
            buf.consume(1);
            assert!(buf.read_pos <= buf.write_pos);
            assert!(buf.write_pos <= buf.storage.len());
        }
    }
}
