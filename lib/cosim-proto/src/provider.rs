//! The slave-provider directory protocol (spec.md §4.7, a supplement found
//! in `original_source/` and carried forward as an ambient directory
//! service). A provider advertises the slave types it can instantiate and
//! spawns new slave instances on request, grounded on the
//! `services/authenticator` request/response idiom: a small closed set of
//! request/response message pairs, each with its own body type, encoded
//! the same header-plus-bincode-body way as `control.rs`.

use crate::error::ProtoError;
use crate::model::SlaveTypeDescription;
use cosim_wire::frame::Header;
use cosim_wire::message::Message;
use serde::{Deserialize, Serialize};

pub const PROVIDER_PROTOCOL_VERSION: u16 = 0;

macro_rules! message_types {
    ($($name:ident = $code:expr),* $(,)?) => {
        #[derive(Debug, Copy, Clone, Eq, PartialEq)]
        #[repr(u16)]
        pub enum ProviderMessageType {
            $($name = $code),*
        }

        impl ProviderMessageType {
            pub fn from_code(code: u16) -> Result<ProviderMessageType, ProtoError> {
                match code {
                    $($code => Ok(ProviderMessageType::$name),)*
                    other => Err(ProtoError::UnknownMessageType(other)),
                }
            }
        }
    };
}

message_types! {
    GetSlaveTypes = 101,
    GetSlaveTypesOk = 102,
    Instantiate = 103,
    InstantiateOk = 104,
    InstantiateFail = 105,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetSlaveTypesOkBody {
    pub slave_types: Vec<SlaveTypeDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiateBody {
    pub slave_type_uuid: String,
    pub instance_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiateOkBody {
    pub control_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantiateFailBody {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderMessage {
    GetSlaveTypes,
    GetSlaveTypesOk(GetSlaveTypesOkBody),
    Instantiate(InstantiateBody),
    InstantiateOk(InstantiateOkBody),
    InstantiateFail(InstantiateFailBody),
}

impl ProviderMessage {
    pub fn message_type(&self) -> ProviderMessageType {
        match self {
            ProviderMessage::GetSlaveTypes => ProviderMessageType::GetSlaveTypes,
            ProviderMessage::GetSlaveTypesOk(_) => ProviderMessageType::GetSlaveTypesOk,
            ProviderMessage::Instantiate(_) => ProviderMessageType::Instantiate,
            ProviderMessage::InstantiateOk(_) => ProviderMessageType::InstantiateOk,
            ProviderMessage::InstantiateFail(_) => ProviderMessageType::InstantiateFail,
        }
    }

    pub fn encode(&self, version: u16) -> Message {
        let header = Header::new(self.message_type() as u16, version).make_header();
        let mut message = vec![header];

        let body = match self {
            ProviderMessage::GetSlaveTypes => None,
            ProviderMessage::GetSlaveTypesOk(body) => Some(bincode::serialize(body)),
            ProviderMessage::Instantiate(body) => Some(bincode::serialize(body)),
            ProviderMessage::InstantiateOk(body) => Some(bincode::serialize(body)),
            ProviderMessage::InstantiateFail(body) => Some(bincode::serialize(body)),
        };

        if let Some(body) = body {
            message.push(body.expect("provider message bodies always serialize"));
        }

        message
    }

    pub fn decode(message: &Message) -> Result<(u16, ProviderMessage), ProtoError> {
        let header_frame = message.get(0).ok_or(ProtoError::MissingBody)?;
        let header = Header::parse_header(header_frame)?;
        let message_type = ProviderMessageType::from_code(header.message_type)?;

        macro_rules! body {
            () => {{
                let frame = message.get(1).ok_or(ProtoError::MissingBody)?;
                bincode::deserialize(frame)?
            }};
        }

        let decoded = match message_type {
            ProviderMessageType::GetSlaveTypes => ProviderMessage::GetSlaveTypes,
            ProviderMessageType::GetSlaveTypesOk => ProviderMessage::GetSlaveTypesOk(body!()),
            ProviderMessageType::Instantiate => ProviderMessage::Instantiate(body!()),
            ProviderMessageType::InstantiateOk => ProviderMessage::InstantiateOk(body!()),
            ProviderMessageType::InstantiateFail => ProviderMessage::InstantiateFail(body!()),
        };

        Ok((header.version, decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Causality, DataType, VariableDescription, VariableId, Variability};

    fn sample_description() -> SlaveTypeDescription {
        SlaveTypeDescription {
            name: "integrator".into(),
            uuid: "00000000-0000-0000-0000-000000000001".into(),
            description: "".into(),
            author: "".into(),
            version: "1.0".into(),
            variables: vec![VariableDescription {
                id: VariableId(0),
                name: "y".into(),
                data_type: DataType::Real,
                causality: Causality::Output,
                variability: Variability::Continuous,
            }],
        }
    }

    #[test]
    fn get_slave_types_round_trips() {
        let msg = ProviderMessage::GetSlaveTypesOk(GetSlaveTypesOkBody {
            slave_types: vec![sample_description()],
        });
        let encoded = msg.encode(0);
        let (version, decoded) = ProviderMessage::decode(&encoded).unwrap();
        assert_eq!(version, 0);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn instantiate_round_trips() {
        let msg = ProviderMessage::Instantiate(InstantiateBody {
            slave_type_uuid: "00000000-0000-0000-0000-000000000001".into(),
            instance_name: "tank1".into(),
        });
        let encoded = msg.encode(0);
        assert_eq!(ProviderMessage::decode(&encoded).unwrap().1, msg);
    }

    #[test]
    fn request_with_no_body_round_trips() {
        let msg = ProviderMessage::GetSlaveTypes;
        let encoded = msg.encode(0);
        assert_eq!(ProviderMessage::decode(&encoded).unwrap().1, msg);
    }
}
