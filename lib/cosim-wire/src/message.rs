use crate::buffer::Buffer;
use crate::error::WireError;
use crate::frame::Frame;
use byteorder::{ByteOrder, LittleEndian};

/// A message is a sequence of one or more frames (§4.1): frame 0 is always
/// the header, frame 1 (when present) is the body, further frames carry
/// opaque byte strings.
pub type Message = Vec<Frame>;

/// Largest single frame this workspace accepts from the wire. Bounds the
/// amount of memory a malformed or malicious length prefix can make us
/// allocate before it is rejected.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

const COUNT_SIZE: usize = 2;
const LEN_SIZE: usize = 4;

/// Encodes a [`Message`] as `[frame_count: u16 LE]{[len: u32 LE][bytes]}*`
/// and appends it to `out` for sending on the next `Buffer::egress`.
pub fn write_message(out: &mut Buffer, message: &Message) {
    let mut count_buf = [0u8; COUNT_SIZE];
    LittleEndian::write_u16(&mut count_buf, message.len() as u16);
    out.push(&count_buf);

    for frame in message {
        let mut len_buf = [0u8; LEN_SIZE];
        LittleEndian::write_u32(&mut len_buf, frame.len() as u32);
        out.push(&len_buf);
        out.push(frame);
    }
}

/// Attempts to parse one complete message from the front of `buf`, without
/// consuming anything unless a full message is present. Returns `Ok(None)`
/// when more data is needed (the non-blocking-poll equivalent of the
/// spec's "Wait" outcome), consistent with how the teacher's channel code
/// treats a partially-arrived frame as benign rather than an error.
pub fn try_read_message(buf: &mut Buffer) -> Result<Option<Message>, WireError> {
    let count_bytes = match buf.peek(0, COUNT_SIZE) {
        Some(bytes) => bytes,
        None => return Ok(None),
    };
    let frame_count = LittleEndian::read_u16(&count_bytes) as usize;

    let mut offset = COUNT_SIZE;
    let mut frames = Vec::with_capacity(frame_count);

    for _ in 0..frame_count {
        let len_bytes = match buf.peek(offset, LEN_SIZE) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let frame_len = LittleEndian::read_u32(&len_bytes);

        if frame_len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(frame_len, MAX_FRAME_SIZE));
        }

        offset += LEN_SIZE;

        let frame_bytes = match buf.peek(offset, frame_len as usize) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        offset += frame_len as usize;
        frames.push(frame_bytes);
    }

    buf.consume(offset);
    Ok(Some(frames))
}
