//! Variable-sample encoding for the data plane (spec.md §4.1). Frame 0 is
//! the 6-byte `[SlaveID:2][VariableID:4]` topic prefix (also the pub/sub
//! filter key); frame 1 is `[StepID:8]`; frame 2 is the scalar, `bincode`-
//! encoded like every other payload in this crate.

use crate::error::ProtoError;
use crate::model::{ScalarValue, SlaveId, StepId, VariableId, VariableRef};
use cosim_wire::frame::{encode_step_id, encode_topic, parse_step_id, parse_topic};
use cosim_wire::message::Message;

pub fn encode_sample(source: VariableRef, step_id: StepId, value: &ScalarValue) -> Message {
    let topic = encode_topic(source.slave.0, source.variable.0).to_vec();
    let step = encode_step_id(step_id.0).to_vec();
    let body = bincode::serialize(value).expect("scalar values always serialize");
    vec![topic, step, body]
}

pub fn decode_sample(message: &Message) -> Result<(VariableRef, StepId, ScalarValue), ProtoError> {
    let topic_frame = message.get(0).ok_or(ProtoError::MissingBody)?;
    let (slave, variable) = parse_topic(topic_frame)?;

    let step_frame = message.get(1).ok_or(ProtoError::MissingBody)?;
    let step_id = parse_step_id(step_frame)?;

    let body_frame = message.get(2).ok_or(ProtoError::MissingBody)?;
    let value = bincode::deserialize(body_frame)?;

    Ok((VariableRef::new(SlaveId(slave), VariableId(variable)), StepId(step_id), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_round_trips() {
        let source = VariableRef::new(SlaveId(3), VariableId(7));
        let encoded = encode_sample(source, StepId(42), &ScalarValue::Real(1.5));
        let (decoded_source, step_id, value) = decode_sample(&encoded).unwrap();
        assert_eq!(decoded_source, source);
        assert_eq!(step_id, StepId(42));
        assert_eq!(value, ScalarValue::Real(1.5));
    }
}
