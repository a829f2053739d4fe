use std::io;

/// Wire-level failures. Fatal to whichever connection produced them — the
/// caller's job is to decide what that means for the peer (§7: a malformed
/// or unexpected message is a `ProtocolViolation`, fatal to that peer only).
#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("frame header has wrong length: expected 4 bytes, got {0}")]
    HeaderLength(usize),

    #[error("unknown message type code {0}")]
    UnknownMessageType(u16),

    #[error("frame exceeds the maximum allowed size ({0} > {1})")]
    FrameTooLarge(u32, u32),

    #[error("message is missing its body frame")]
    MissingBody,

    #[error("connection closed mid-frame")]
    Truncated,

    #[error(transparent)]
    Io(#[from] io::Error),
}
