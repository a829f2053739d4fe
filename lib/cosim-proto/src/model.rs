//! The data model (spec.md §3), unchanged in meaning from the distilled
//! spec. Newtypes follow the teacher's `#[repr(transparent)]` single-field
//! wrapper style (`neutronium::net::frame::PayloadInfo`) without the
//! `custom_type_id!` macro machinery, which leans on unstable nightly
//! features (`std::intrinsics::type_name`, `Unsize`) that have no place in
//! idiomatic stable Rust.

use serde::{Deserialize, Serialize};
use std::f64;

/// Simulation time in seconds. `f64::INFINITY` denotes "eternity" (no
/// declared end), per spec.md §3.
pub type TimePoint = f64;
pub type TimeDuration = f64;

pub const ETERNITY: TimePoint = f64::INFINITY;

/// Monotonically increasing step counter, starting at 0 for the first
/// `Step`. Tags every variable sample so receivers can reject stale or
/// premature values (I5).
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StepId(pub u64);

impl StepId {
    pub const FIRST: StepId = StepId(0);

    #[inline]
    pub fn next(self) -> StepId {
        StepId(self.0 + 1)
    }
}

/// Opaque 16-bit identifier, unique within one execution, assigned by the
/// master on admission (spec.md §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlaveId(pub u16);

/// 32-bit identifier, unique within a slave's type description.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct VariableId(pub u32);

/// Identifies a variable endpoint globally within the execution.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VariableRef {
    pub slave: SlaveId,
    pub variable: VariableId,
}

impl VariableRef {
    pub fn new(slave: SlaveId, variable: VariableId) -> VariableRef {
        VariableRef { slave, variable }
    }
}

/// A tagged union of the scalar types a variable can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Causality {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    Local,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Variability {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    Continuous,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Real,
    Integer,
    Boolean,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescription {
    pub id: VariableId,
    pub name: String,
    pub data_type: DataType,
    pub causality: Causality,
    pub variability: Variability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveTypeDescription {
    pub name: String,
    pub uuid: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub variables: Vec<VariableDescription>,
}

impl SlaveTypeDescription {
    pub fn output_variable(&self, id: VariableId) -> Option<&VariableDescription> {
        self.variables
            .iter()
            .find(|v| v.id == id && v.causality == Causality::Output)
    }
}

/// One `VariableConnection`: an input wired to a remote output. Carries the
/// resolved data-plane endpoint of the source slave alongside its
/// `VariableRef` — a Slave Agent has no directory of its own and cannot
/// turn a bare `SlaveId` into a dialable address, so the Execution Manager
/// (which owns the directory, spec.md §4.6) resolves it before forwarding
/// the setting on the wire.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct VariableConnection {
    pub input: VariableId,
    pub source: VariableRef,
    pub source_endpoint: String,
}

/// One entry of a `SET_VARS` request (spec.md §3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableSetting {
    SetValue(VariableId, ScalarValue),
    Connect(VariableConnection),
    Disconnect(VariableId),
}
