//! The Execution Manager's state (spec.md §4.6), kept free of sockets so it
//! can be driven and tested synchronously — mirrors the split
//! `cosim-slave::core::SlaveAgentCore` makes between state and wire
//! plumbing (`network.rs`).

use crate::error::ExecutionError;
use crate::record::{RecordPhase, SlaveRecord};
use cosim_proto::config::ExecutionOptions;
use cosim_proto::model::{SlaveId, SlaveTypeDescription, StepId, TimeDuration, TimePoint, VariableRef, ETERNITY};
use cosim_support::logging::{self, Logger};
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExecutionPhase {
    Setup,
    Config,
    Primed,
    Stepping,
    Stepped,
    StepAccepted,
}

pub struct ExecutionManagerCore {
    options: ExecutionOptions,
    phase: ExecutionPhase,
    slaves: HashMap<SlaveId, SlaveRecord>,
    next_slave_id: u16,
    current_t: TimePoint,
    step_id: StepId,
    log: Logger,
}

impl ExecutionManagerCore {
    /// I1: `start_time` must not be after `stop_time`, unless `stop_time` is
    /// `ETERNITY` (an execution with no fixed end always admits any start).
    /// Per spec.md §6 this is a configuration error.
    pub fn new(options: ExecutionOptions, log: Logger) -> Result<ExecutionManagerCore, ExecutionError> {
        if options.stop_time != ETERNITY && options.start_time > options.stop_time {
            return Err(ExecutionError::InputError(format!(
                "start_time {} is after stop_time {}",
                options.start_time, options.stop_time
            )));
        }

        let current_t = options.start_time;
        Ok(ExecutionManagerCore {
            options,
            phase: ExecutionPhase::Setup,
            slaves: HashMap::new(),
            next_slave_id: 0,
            current_t,
            step_id: StepId::FIRST,
            log: log.new(logging::o!("component" => "execution-manager")),
        })
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn current_t(&self) -> TimePoint {
        self.current_t
    }

    pub fn step_id(&self) -> StepId {
        self.step_id
    }

    pub fn record(&self, id: SlaveId) -> Option<&SlaveRecord> {
        self.slaves.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = (&SlaveId, &SlaveRecord)> {
        self.slaves.iter()
    }

    /// I2: names must be unique within the execution. Called before a
    /// connection is even attempted.
    pub fn check_name_unique(&self, name: &str) -> Result<(), ExecutionError> {
        if self.slaves.values().any(|record| record.name == name) {
            return Err(ExecutionError::InputError(format!("duplicate slave name {:?}", name)));
        }
        Ok(())
    }

    /// Allocates a SlaveID and inserts the record once `HELLO_ACK` has been
    /// received (spec.md §4.6: "receive HELLO_ACK, allocate a SlaveID").
    pub fn admit(&mut self, name: String, control_endpoint: String, pub_endpoint: String, description: SlaveTypeDescription) -> SlaveId {
        let id = SlaveId(self.next_slave_id);
        self.next_slave_id += 1;

        let mut record = SlaveRecord::new(name, control_endpoint);
        record.pub_endpoint = Some(pub_endpoint);
        record.description = Some(description);
        record.phase = RecordPhase::Ready;
        logging::info!(self.log, "slave admitted"; "slave_id" => id.0, "name" => %record.name);

        self.slaves.insert(id, record);
        self.phase = ExecutionPhase::Config;
        id
    }

    pub fn mark_lost(&mut self, id: SlaveId, reason: &str) {
        if let Some(record) = self.slaves.get_mut(&id) {
            logging::warn!(self.log, "slave lost"; "slave_id" => id.0, "reason" => reason);
            record.phase = RecordPhase::Lost;
        }
    }

    /// I3: a `Connect` whose source refers to an unknown SlaveID or an
    /// unknown output VariableID is rejected before any socket state is
    /// mutated. Returns the resolved source's data endpoint for the caller
    /// to stamp onto the `VariableConnection` sent over the wire.
    pub fn resolve_connect_source(&self, source: VariableRef) -> Result<String, ExecutionError> {
        let record = self
            .slaves
            .get(&source.slave)
            .ok_or_else(|| ExecutionError::InputError(format!("unknown source slave {:?}", source.slave)))?;

        let description = record
            .description
            .as_ref()
            .ok_or_else(|| ExecutionError::InputError(format!("slave {:?} has no description yet", source.slave)))?;

        description
            .output_variable(source.variable)
            .ok_or_else(|| ExecutionError::InputError(format!("unknown output variable {:?} on slave {:?}", source.variable, source.slave)))?;

        record
            .pub_endpoint
            .clone()
            .ok_or_else(|| ExecutionError::InputError(format!("slave {:?} has no data endpoint yet", source.slave)))
    }

    pub fn begin_step(&mut self) -> (TimePoint, StepId) {
        self.phase = ExecutionPhase::Stepping;
        (self.current_t, self.step_id)
    }

    pub fn record_step_result(&mut self, id: SlaveId, ok: bool) {
        if let Some(record) = self.slaves.get_mut(&id) {
            record.phase = if ok { RecordPhase::Stepped } else { RecordPhase::Ready };
            if ok {
                record.last_step_id = self.step_id;
            }
        }
    }

    /// Called once the step's rendezvous has fired successfully: advances
    /// `current_t` and `step_id` (P2).
    pub fn complete_step(&mut self, step_size: TimeDuration) {
        self.current_t += step_size;
        self.step_id = self.step_id.next();
        self.phase = ExecutionPhase::Stepped;
    }

    pub fn record_accept_step(&mut self, id: SlaveId) {
        if let Some(record) = self.slaves.get_mut(&id) {
            record.phase = RecordPhase::Ready;
        }
    }

    pub fn complete_accept_step(&mut self) {
        self.phase = ExecutionPhase::StepAccepted;
    }

    pub fn terminate_all(&mut self) {
        for record in self.slaves.values_mut() {
            record.phase = RecordPhase::Terminated;
        }
    }

    pub fn active_slave_ids(&self) -> Vec<SlaveId> {
        self.slaves
            .iter()
            .filter(|(_, record)| record.phase != RecordPhase::Lost && record.phase != RecordPhase::Terminated)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosim_proto::model::{Causality, DataType, Variability, VariableDescription, VariableId};

    fn new_manager() -> ExecutionManagerCore {
        ExecutionManagerCore::new(ExecutionOptions::default(), cosim_support::logging::discard()).unwrap()
    }

    fn output_description(id: VariableId) -> SlaveTypeDescription {
        SlaveTypeDescription {
            name: "integrator".into(),
            uuid: "u".into(),
            description: "".into(),
            author: "".into(),
            version: "1.0".into(),
            variables: vec![VariableDescription {
                id,
                name: "y".into(),
                data_type: DataType::Real,
                causality: Causality::Output,
                variability: Variability::Continuous,
            }],
        }
    }

    // I1
    #[test]
    fn start_time_after_finite_stop_time_is_rejected() {
        let options = ExecutionOptions {
            start_time: 10.0,
            stop_time: 5.0,
            ..ExecutionOptions::default()
        };
        let err = ExecutionManagerCore::new(options, cosim_support::logging::discard()).unwrap_err();
        assert!(matches!(err, ExecutionError::InputError(_)));
    }

    // I1: an eternity stop_time accepts any start_time.
    #[test]
    fn start_time_after_eternity_stop_time_is_accepted() {
        let options = ExecutionOptions {
            start_time: 10.0,
            stop_time: ETERNITY,
            ..ExecutionOptions::default()
        };
        assert!(ExecutionManagerCore::new(options, cosim_support::logging::discard()).is_ok());
    }

    // P1: SlaveIDs are unique and monotonically allocated.
    #[test]
    fn admission_allocates_unique_slave_ids() {
        let mut manager = new_manager();
        let a = manager.admit("a".into(), "tcp://x:1".into(), "tcp://x:2".into(), output_description(VariableId(0)));
        let b = manager.admit("b".into(), "tcp://y:1".into(), "tcp://y:2".into(), output_description(VariableId(0)));
        assert_ne!(a, b);
    }

    // I2
    #[test]
    fn duplicate_name_is_rejected_before_admission() {
        let mut manager = new_manager();
        manager.admit("a".into(), "tcp://x:1".into(), "tcp://x:2".into(), output_description(VariableId(0)));
        assert!(manager.check_name_unique("a").is_err());
        assert!(manager.check_name_unique("b").is_ok());
    }

    // I3 / B1 / S3
    #[test]
    fn connect_to_unknown_slave_is_rejected() {
        let manager = new_manager();
        let err = manager
            .resolve_connect_source(VariableRef::new(SlaveId(99), VariableId(0)))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InputError(_)));
    }

    #[test]
    fn connect_to_unknown_output_variable_is_rejected() {
        let mut manager = new_manager();
        let id = manager.admit("a".into(), "tcp://x:1".into(), "tcp://x:2".into(), output_description(VariableId(0)));
        let err = manager.resolve_connect_source(VariableRef::new(id, VariableId(7))).unwrap_err();
        assert!(matches!(err, ExecutionError::InputError(_)));
    }

    #[test]
    fn connect_to_known_output_resolves_its_pub_endpoint() {
        let mut manager = new_manager();
        let id = manager.admit("a".into(), "tcp://x:1".into(), "tcp://x:2".into(), output_description(VariableId(0)));
        let endpoint = manager.resolve_connect_source(VariableRef::new(id, VariableId(0))).unwrap();
        assert_eq!(endpoint, "tcp://x:2");
    }

    // P2
    #[test]
    fn current_t_advances_by_step_size_each_completed_step() {
        let mut manager = new_manager();
        manager.begin_step();
        manager.complete_step(0.1);
        manager.begin_step();
        manager.complete_step(0.1);
        assert!((manager.current_t() - 0.2).abs() < 1e-12);
        assert_eq!(manager.step_id(), StepId(2));
    }
}
