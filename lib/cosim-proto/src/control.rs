//! Control-plane message taxonomy and encoders/decoders (spec.md §4.4).
//! Frame 0 is always the `cosim_wire::frame::Header`; frame 1 (when the
//! message carries a payload) is that payload `bincode`-encoded. This
//! mirrors the teacher's "frame 0 is the category/type, frame 1 is the
//! fixed-layout body" split in `neutronium::net::frame::Frame`, generalized
//! from the teacher's four hand-written connection-lifecycle variants to
//! the full execution-coordination taxonomy.

use crate::config::ExecutionOptions;
use crate::error::ProtoError;
use crate::model::{ScalarValue, SlaveId, SlaveTypeDescription, StepId, TimeDuration, TimePoint, VariableSetting};
use cosim_wire::frame::Header;
use cosim_wire::message::Message;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u16 = 0;

macro_rules! message_types {
    ($($name:ident = $code:expr),* $(,)?) => {
        #[derive(Debug, Copy, Clone, Eq, PartialEq)]
        #[repr(u16)]
        pub enum MessageType {
            $($name = $code),*
        }

        impl MessageType {
            pub fn from_code(code: u16) -> Result<MessageType, ProtoError> {
                match code {
                    $($code => Ok(MessageType::$name),)*
                    other => Err(ProtoError::UnknownMessageType(other)),
                }
            }
        }
    };
}

message_types! {
    Hello = 1,
    HelloAck = 2,
    Denied = 3,
    Setup = 4,
    SetVars = 5,
    SetVarsOk = 6,
    SetVarsFail = 7,
    Step = 8,
    StepOk = 9,
    StepFail = 10,
    AcceptStep = 11,
    AcceptStepOk = 12,
    Terminate = 13,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloBody {
    pub execution_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloAckBody {
    pub description: SlaveTypeDescription,
    pub pub_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeniedBody {
    pub reason: String,
}

/// Carries the `SlaveId` the master allocated on admission (spec.md §3,
/// "assigned by the master on admission"). The table in spec.md §4.4 does
/// not say how the slave learns its own id, but a Slave Agent must tag
/// every sample it publishes with `[SlaveID:2]...` (§4.1), so `SETUP` is
/// where the master hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupBody {
    pub assigned_slave_id: SlaveId,
    pub options: ExecutionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVarsBody {
    pub settings: Vec<VariableSetting>,
}

/// Shared by `SET_VARS_OK` and `SET_VARS_FAIL` — the message type code is
/// what distinguishes "every setting succeeded" from "at least one did
/// not"; the teacher's `ControlFrame` makes the same choice of carrying
/// identically-shaped payloads under distinct categories for `Keepalive`
/// vs. `ConnectionAccepted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVarsResultBody {
    pub results: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepBody {
    pub current_t: TimePoint,
    pub step_size: TimeDuration,
    pub step_id: StepId,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailBody {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSampleBody {
    pub value: ScalarValue,
}

/// A parsed, type-checked control message paired with its protocol
/// version. Construct with [`ControlMessage::encode`] /
/// [`ControlMessage::decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Hello(HelloBody),
    HelloAck(HelloAckBody),
    Denied(DeniedBody),
    Setup(SetupBody),
    SetVars(SetVarsBody),
    SetVarsOk(SetVarsResultBody),
    SetVarsFail(SetVarsResultBody),
    Step(StepBody),
    StepOk,
    StepFail(StepFailBody),
    AcceptStep,
    AcceptStepOk,
    Terminate,
}

impl ControlMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ControlMessage::Hello(_) => MessageType::Hello,
            ControlMessage::HelloAck(_) => MessageType::HelloAck,
            ControlMessage::Denied(_) => MessageType::Denied,
            ControlMessage::Setup(_) => MessageType::Setup,
            ControlMessage::SetVars(_) => MessageType::SetVars,
            ControlMessage::SetVarsOk(_) => MessageType::SetVarsOk,
            ControlMessage::SetVarsFail(_) => MessageType::SetVarsFail,
            ControlMessage::Step(_) => MessageType::Step,
            ControlMessage::StepOk => MessageType::StepOk,
            ControlMessage::StepFail(_) => MessageType::StepFail,
            ControlMessage::AcceptStep => MessageType::AcceptStep,
            ControlMessage::AcceptStepOk => MessageType::AcceptStepOk,
            ControlMessage::Terminate => MessageType::Terminate,
        }
    }

    /// Builds the wire `Message`: header frame plus an optional
    /// `bincode`-encoded body frame. Every response frame carries the same
    /// protocol version as its request (spec.md §4.4).
    pub fn encode(&self, version: u16) -> Message {
        let header = Header::new(self.message_type() as u16, version).make_header();
        let mut message = vec![header];

        if let Some(body) = self.encode_body() {
            message.push(body);
        }

        message
    }

    fn encode_body(&self) -> Option<Vec<u8>> {
        macro_rules! body {
            ($value:expr) => {
                Some(bincode::serialize($value).expect("control message bodies always serialize"))
            };
        }

        match self {
            ControlMessage::Hello(body) => body!(body),
            ControlMessage::HelloAck(body) => body!(body),
            ControlMessage::Denied(body) => body!(body),
            ControlMessage::Setup(body) => body!(body),
            ControlMessage::SetVars(body) => body!(body),
            ControlMessage::SetVarsOk(body) => body!(body),
            ControlMessage::SetVarsFail(body) => body!(body),
            ControlMessage::Step(body) => body!(body),
            ControlMessage::StepOk => None,
            ControlMessage::StepFail(body) => body!(body),
            ControlMessage::AcceptStep => None,
            ControlMessage::AcceptStepOk => None,
            ControlMessage::Terminate => None,
        }
    }

    /// Parses a wire `Message` into a `(version, ControlMessage)` pair.
    /// Fails with `ProtoError` (this crate's `ProtocolViolation`) on a
    /// wrong-length header, unknown type code, or a body that doesn't
    /// decode as the shape the type code implies.
    pub fn decode(message: &Message) -> Result<(u16, ControlMessage), ProtoError> {
        let header_frame = message.get(0).ok_or(ProtoError::MissingBody)?;
        let header = Header::parse_header(header_frame)?;
        let message_type = MessageType::from_code(header.message_type)?;

        macro_rules! body {
            () => {{
                let frame = message.get(1).ok_or(ProtoError::MissingBody)?;
                bincode::deserialize(frame)?
            }};
        }

        let decoded = match message_type {
            MessageType::Hello => ControlMessage::Hello(body!()),
            MessageType::HelloAck => ControlMessage::HelloAck(body!()),
            MessageType::Denied => ControlMessage::Denied(body!()),
            MessageType::Setup => ControlMessage::Setup(body!()),
            MessageType::SetVars => ControlMessage::SetVars(body!()),
            MessageType::SetVarsOk => ControlMessage::SetVarsOk(body!()),
            MessageType::SetVarsFail => ControlMessage::SetVarsFail(body!()),
            MessageType::Step => ControlMessage::Step(body!()),
            MessageType::StepOk => ControlMessage::StepOk,
            MessageType::StepFail => ControlMessage::StepFail(body!()),
            MessageType::AcceptStep => ControlMessage::AcceptStep,
            MessageType::AcceptStepOk => ControlMessage::AcceptStepOk,
            MessageType::Terminate => ControlMessage::Terminate,
        };

        Ok((header.version, decoded))
    }
}
