use cosim_wire::WireError;

/// Failures decoding or encoding a control-plane message. Every variant
/// here is the `ProtocolViolation` case from spec.md §7 — malformed or
/// unexpected messages are fatal to the one peer that sent them, never
/// swallowed silently.
#[derive(thiserror::Error, Debug)]
pub enum ProtoError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown message type code {0}")]
    UnknownMessageType(u16),

    #[error("message body did not decode as the expected type: {0}")]
    BodyDecode(#[from] Box<bincode::ErrorKind>),

    #[error("message is missing its body frame")]
    MissingBody,
}
