use std::collections::VecDeque;
use std::io;

/// A growable FIFO byte queue, filled from a non-blocking reader and
/// drained into a non-blocking writer across reactor iterations.
///
/// Grounded on `neutronium::net::buffer::Buffer`'s `ingress`/`egress` shape;
/// rebuilt on `std::collections::VecDeque` rather than the teacher's
/// `slice_deque::SliceDeque` dependency, which needs an unstable allocator
/// API and is not an idiomatic-stable-Rust fit (see DESIGN.md).
#[derive(Default)]
pub struct Buffer {
    data: VecDeque<u8>,
}

impl Buffer {
    #[inline]
    pub fn new() -> Buffer {
        Buffer { data: VecDeque::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read as much as possible from `reader` into the buffer without
    /// blocking. Returns the number of bytes read; `WouldBlock` is
    /// translated into `Ok(0)` so callers can treat "nothing more right
    /// now" uniformly with "peer sent nothing this iteration".
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let mut total = 0;
        let mut chunk = [0u8; 65536];

        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    self.data.extend(&chunk[..n]);
                    total += n;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }

    /// Write as much of the buffer as possible to `writer` without
    /// blocking, draining what was written.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut total = 0;

        while !self.data.is_empty() {
            let (front, _) = self.data.as_slices();
            match writer.write(front) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.data.drain(..n);
                    total += n;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            }
        }

        Ok(total)
    }

    /// Appends bytes to be sent on the next `egress`.
    #[inline]
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend(bytes);
    }

    /// Peeks `len` bytes starting at `offset` without consuming them.
    /// Used by the message codec to check whether a full frame has
    /// arrived before committing to parsing it.
    pub fn peek(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        if offset + len > self.data.len() {
            return None;
        }
        Some(self.data.iter().skip(offset).take(len).copied().collect())
    }

    /// Drops the first `count` bytes, e.g. after a full message has been
    /// parsed out of the head of the buffer.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        self.data.drain(..count);
    }
}
