use crate::error::WireError;
use byteorder::{ByteOrder, LittleEndian};

/// An opaque frame: one indivisible chunk of a [`Message`](crate::message::Message).
pub type Frame = Vec<u8>;

pub const HEADER_SIZE: usize = 4;

/// Frame 0 of every control-plane message: `[type: u16 LE][version: u16 LE]`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    pub message_type: u16,
    pub version: u16,
}

impl Header {
    #[inline]
    pub fn new(message_type: u16, version: u16) -> Header {
        Header { message_type, version }
    }

    /// Builds the header frame (§4.1).
    #[inline]
    pub fn make_header(self) -> Frame {
        let mut frame = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut frame[0..2], self.message_type);
        LittleEndian::write_u16(&mut frame[2..4], self.version);
        frame
    }

    /// Parses frame 0. Fails with `ProtocolViolation`-shaped errors on wrong
    /// length; unknown type codes are left for the protocol layer
    /// (`cosim-proto`) to reject, since this crate doesn't know the closed
    /// set of valid types.
    #[inline]
    pub fn parse_header(frame: &[u8]) -> Result<Header, WireError> {
        if frame.len() != HEADER_SIZE {
            return Err(WireError::HeaderLength(frame.len()));
        }

        Ok(Header {
            message_type: LittleEndian::read_u16(&frame[0..2]),
            version: LittleEndian::read_u16(&frame[2..4]),
        })
    }
}

/// The fixed 6-byte topic prefix `[SlaveID:2][VariableID:4]` used both as
/// frame 0 of a variable sample and as the PUB/SUB filter key (§4.1, §4.3).
pub const TOPIC_SIZE: usize = 6;

#[inline]
pub fn encode_topic(slave_id: u16, variable_id: u32) -> [u8; TOPIC_SIZE] {
    let mut buf = [0u8; TOPIC_SIZE];
    LittleEndian::write_u16(&mut buf[0..2], slave_id);
    LittleEndian::write_u32(&mut buf[2..6], variable_id);
    buf
}

#[inline]
pub fn parse_topic(buf: &[u8]) -> Result<(u16, u32), WireError> {
    if buf.len() != TOPIC_SIZE {
        return Err(WireError::HeaderLength(buf.len()));
    }

    Ok((LittleEndian::read_u16(&buf[0..2]), LittleEndian::read_u32(&buf[2..6])))
}

pub const STEP_ID_SIZE: usize = 8;

#[inline]
pub fn encode_step_id(step_id: u64) -> [u8; STEP_ID_SIZE] {
    let mut buf = [0u8; STEP_ID_SIZE];
    LittleEndian::write_u64(&mut buf, step_id);
    buf
}

#[inline]
pub fn parse_step_id(buf: &[u8]) -> Result<u64, WireError> {
    if buf.len() != STEP_ID_SIZE {
        return Err(WireError::HeaderLength(buf.len()));
    }
    Ok(LittleEndian::read_u64(buf))
}
