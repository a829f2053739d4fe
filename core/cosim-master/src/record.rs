//! `SlaveRecord` (spec.md §3/§4.6): everything the Execution Manager knows
//! about one admitted slave. Owned in a `HashMap<SlaveId, SlaveRecord>` keyed
//! by SlaveID, never by pointer — spec.md §9's arena-style ownership note.

use cosim_proto::model::{SlaveTypeDescription, StepId};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecordPhase {
    Admitting,
    Ready,
    Stepping,
    Stepped,
    Lost,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SlaveRecord {
    pub name: String,
    pub control_endpoint: String,
    pub pub_endpoint: Option<String>,
    pub description: Option<SlaveTypeDescription>,
    pub phase: RecordPhase,
    pub last_step_id: StepId,
}

impl SlaveRecord {
    pub fn new(name: String, control_endpoint: String) -> SlaveRecord {
        SlaveRecord {
            name,
            control_endpoint,
            pub_endpoint: None,
            description: None,
            phase: RecordPhase::Admitting,
            last_step_id: StepId::FIRST,
        }
    }
}
