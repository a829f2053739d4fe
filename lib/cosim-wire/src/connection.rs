//! A non-blocking, message-framed TCP connection: the buffer-fill / drain
//! loop `neutronium::net::channel::Channel` runs around a `TcpStream`,
//! stripped of its encryption and handshake machinery (this workspace's
//! control channel authenticates nothing beyond protocol version; see
//! DESIGN.md). Shared by the master's and slave's REQ/REP and PUB/SUB
//! socket handling so neither reimplements the read/write pump.

use crate::buffer::Buffer;
use crate::error::WireError;
use crate::message::{try_read_message, write_message, Message};
use mio::net::TcpStream;
use std::io;

pub struct Connection {
    stream: TcpStream,
    read_buf: Buffer,
    write_buf: Buffer,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            stream,
            read_buf: Buffer::new(),
            write_buf: Buffer::new(),
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Queues `message` for the next `flush`; does not touch the socket.
    pub fn enqueue(&mut self, message: &Message) {
        write_message(&mut self.write_buf, message);
    }

    /// Writes as much of the queued bytes as the socket accepts without
    /// blocking. `Ok(true)` means the write buffer fully drained.
    pub fn flush(&mut self) -> io::Result<bool> {
        self.write_buf.egress(&mut self.stream)?;
        Ok(self.write_buf.is_empty())
    }

    /// Reads available bytes into the receive buffer. `Ok(0)` paired with
    /// the peer having shut down its write half means the connection is
    /// closed; callers distinguish that from "nothing new" via
    /// `is_closed_read`.
    pub fn fill(&mut self) -> io::Result<usize> {
        self.read_buf.ingress(&mut self.stream)
    }

    /// Pulls the next complete message out of the receive buffer, if any.
    pub fn try_recv(&mut self) -> Result<Option<Message>, WireError> {
        try_read_message(&mut self.read_buf)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.write_buf.is_empty()
    }
}
