//! The `Instance`/`SlaveType` external interfaces (spec.md §6). These are
//! the abstract boundary the Slave Agent drives and never implements
//! itself; everything on the other side of them — the actual math of a
//! simulation unit — is deliberately out of scope of the coordination
//! layer, mirroring how `flux::shared::GameLogic` keeps the update-loop
//! crate ignorant of what a concrete game does on tick.

use crate::error::ModelError;
use cosim_proto::model::{SlaveTypeDescription, TimeDuration, TimePoint, VariableId};

/// One simulation unit: an integrator over its own local state, driven one
/// step at a time by a Slave Agent.
pub trait Instance: Send {
    fn type_description(&self) -> &SlaveTypeDescription;

    /// Called once, before `start_simulation`, with the parameters carried
    /// by `SETUP` (spec.md §4.4).
    fn setup(
        &mut self,
        slave_name: &str,
        execution_name: &str,
        start_t: TimePoint,
        stop_t: TimePoint,
        adaptive_step: bool,
        relative_tolerance: f64,
    ) -> Result<(), ModelError>;

    fn start_simulation(&mut self) -> Result<(), ModelError>;
    fn end_simulation(&mut self) -> Result<(), ModelError>;

    /// Advances local state by `step_size` starting at `current_t`. `false`
    /// means the step failed (the instance's internal model rejected it,
    /// e.g. a solver non-convergence) and the Slave Agent must reply
    /// `STEP_FAIL` without advancing.
    fn do_step(&mut self, current_t: TimePoint, step_size: TimeDuration) -> bool;

    fn get_real(&self, id: VariableId) -> Result<f64, ModelError>;
    fn set_real(&mut self, id: VariableId, value: f64) -> Result<(), ModelError>;

    fn get_integer(&self, id: VariableId) -> Result<i32, ModelError>;
    fn set_integer(&mut self, id: VariableId, value: i32) -> Result<(), ModelError>;

    fn get_boolean(&self, id: VariableId) -> Result<bool, ModelError>;
    fn set_boolean(&mut self, id: VariableId, value: bool) -> Result<(), ModelError>;

    fn get_string(&self, id: VariableId) -> Result<String, ModelError>;
    fn set_string(&mut self, id: VariableId, value: String) -> Result<(), ModelError>;
}

/// Consumed by the slave-provider directory (spec.md §4.7, §6): a factory
/// for `Instance`s of one named, versioned, UUID-identified type.
pub trait SlaveType: Send + Sync {
    fn description(&self) -> &SlaveTypeDescription;

    /// May fail with a reason string (e.g. resource exhaustion); never
    /// panics.
    fn instantiate(&self) -> Result<Box<dyn Instance>, String>;
}

/// Dispatches a `ScalarValue` onto the right typed getter/setter pair,
/// shared by the Slave Agent's `SET_VARS`/variable-barrier handling so it
/// never needs to match on `DataType` itself.
pub mod scalar {
    use super::*;
    use cosim_proto::model::ScalarValue;

    pub fn get(instance: &dyn Instance, id: VariableId, data_type: cosim_proto::model::DataType) -> Result<ScalarValue, ModelError> {
        use cosim_proto::model::DataType;
        match data_type {
            DataType::Real => instance.get_real(id).map(ScalarValue::Real),
            DataType::Integer => instance.get_integer(id).map(ScalarValue::Integer),
            DataType::Boolean => instance.get_boolean(id).map(ScalarValue::Boolean),
            DataType::String => instance.get_string(id).map(ScalarValue::String),
        }
    }

    pub fn set(instance: &mut dyn Instance, id: VariableId, value: ScalarValue) -> Result<(), ModelError> {
        match value {
            ScalarValue::Real(v) => instance.set_real(id, v),
            ScalarValue::Integer(v) => instance.set_integer(id, v),
            ScalarValue::Boolean(v) => instance.set_boolean(id, v),
            ScalarValue::String(v) => instance.set_string(id, v),
        }
    }
}
