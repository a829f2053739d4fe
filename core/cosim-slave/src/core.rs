//! The Slave Agent's control-message state machine (spec.md §4.5), kept
//! free of sockets so it can be driven and tested synchronously. The
//! networking glue in `network.rs` owns the REP/PUB/SUB sockets and calls
//! into this type; this mirrors how `neutronium::world::World::run_once`
//! separates "what happens this tick" from the poll/dispatch plumbing that
//! calls it.

use crate::error::AgentError;
use crate::phase::SlavePhase;
use crate::varbus::VariableBus;
use cosim_model::instance::scalar;
use cosim_model::Instance;
use cosim_proto::config::ExecutionOptions;
use cosim_proto::control::{
    ControlMessage, DeniedBody, HelloAckBody, HelloBody, SetVarsBody, SetVarsResultBody, StepBody, StepFailBody,
    PROTOCOL_VERSION,
};
use cosim_proto::model::{
    ScalarValue, SlaveId, SlaveTypeDescription, StepId, TimeDuration, TimePoint, VariableId, VariableSetting,
};
use cosim_support::logging::{self, Logger};

/// A change to the SUB side of the variable bus that the networking layer
/// must act on (dial a new peer, or drop a connection with no remaining
/// subscribers).
#[derive(Debug, Clone)]
pub enum SubscriptionEffect {
    Connect { slave_id: SlaveId, endpoint: String },
    DropPeer { slave_id: SlaveId },
}

pub struct StepOutcome {
    pub response: ControlMessage,
    /// Outputs to publish, tagged with the step id they describe. Empty on
    /// failure.
    pub publish: Vec<(VariableId, ScalarValue)>,
}

pub struct SlaveAgentCore {
    phase: SlavePhase,
    slave_name: String,
    instance: Box<dyn Instance>,
    bus: VariableBus,
    options: Option<ExecutionOptions>,
    slave_id: Option<SlaveId>,
    log: Logger,
}

impl SlaveAgentCore {
    pub fn new(slave_name: String, instance: Box<dyn Instance>, log: Logger) -> SlaveAgentCore {
        SlaveAgentCore {
            phase: SlavePhase::Connected,
            slave_name,
            instance,
            bus: VariableBus::new(),
            options: None,
            slave_id: None,
            log: log.new(logging::o!("component" => "slave-agent")),
        }
    }

    pub fn phase(&self) -> SlavePhase {
        self.phase
    }

    /// `None` until the first successful `SETUP`.
    pub fn slave_id(&self) -> Option<SlaveId> {
        self.slave_id
    }

    pub fn bus(&mut self) -> &mut VariableBus {
        &mut self.bus
    }

    /// Read access to the wrapped `Instance`, for tests that need to
    /// inspect a slave's local state without going through the wire.
    pub fn instance(&self) -> &dyn Instance {
        self.instance.as_ref()
    }

    pub fn bus_is_complete(&self) -> bool {
        self.bus.is_complete()
    }

    /// The barrier's per-step timeout expired with inputs still missing
    /// (spec.md §4.3's `TimeoutError(which_inputs_pending)`). Reports
    /// `STEP_FAIL` without calling `Instance::DoStep`.
    pub fn timeout_step(&mut self) -> ControlMessage {
        let pending = self.bus.pending_inputs();
        self.phase = SlavePhase::Ready;
        logging::warn!(self.log, "variable barrier timed out"; "pending_inputs" => pending.len());
        ControlMessage::StepFail(StepFailBody {
            reason: format!("timed out waiting for {} input(s)", pending.len()),
        })
    }

    pub fn description(&self) -> &SlaveTypeDescription {
        self.instance.type_description()
    }

    fn denied(&self, reason: impl Into<String>) -> ControlMessage {
        ControlMessage::Denied(DeniedBody { reason: reason.into() })
    }

    pub fn handle_hello(&mut self, version: u16, _body: HelloBody, pub_endpoint: String) -> ControlMessage {
        if version != PROTOCOL_VERSION {
            logging::warn!(self.log, "rejecting handshake"; "reason" => "version", "got" => version);
            return self.denied(format!("unsupported version {}", version));
        }

        if !self.phase.accepts_hello() {
            return self.denied(format!("HELLO illegal in phase {:?}", self.phase));
        }

        self.phase = SlavePhase::Handshook;
        logging::info!(self.log, "handshake accepted"; "slave" => %self.slave_name);

        ControlMessage::HelloAck(HelloAckBody {
            description: self.instance.type_description().clone(),
            pub_endpoint,
        })
    }

    pub fn handle_setup(
        &mut self,
        assigned_slave_id: SlaveId,
        execution_name: &str,
        start_t: TimePoint,
        stop_t: TimePoint,
        options: ExecutionOptions,
    ) -> Result<ControlMessage, AgentError> {
        if !self.phase.accepts_setup() {
            return Ok(self.denied(format!("SETUP illegal in phase {:?}", self.phase)));
        }

        self.instance
            .setup(&self.slave_name, execution_name, start_t, stop_t, false, 1e-4)?;
        self.instance.start_simulation()?;
        self.options = Some(options);
        self.slave_id = Some(assigned_slave_id);
        self.phase = SlavePhase::Ready;

        logging::info!(self.log, "setup complete"; "execution" => execution_name);
        Ok(ControlMessage::StepOk)
    }

    /// Applies `SET_VARS` in order. Returns the response plus the
    /// subscription-side effects the networking layer must carry out, one
    /// per setting that touched the SUB socket.
    pub fn handle_set_vars(&mut self, body: SetVarsBody) -> (ControlMessage, Vec<SubscriptionEffect>) {
        if !self.phase.accepts_set_vars() {
            return (self.denied(format!("SET_VARS illegal in phase {:?}", self.phase)), Vec::new());
        }

        let mut results = Vec::with_capacity(body.settings.len());
        let mut effects = Vec::new();

        for setting in body.settings {
            match setting {
                VariableSetting::SetValue(id, value) => {
                    results.push(scalar::set(&mut *self.instance, id, value).is_ok());
                }
                VariableSetting::Connect(conn) => {
                    let slave_id = conn.source.slave;
                    let is_new_peer = self.bus.connect(conn.input, conn.source);
                    if is_new_peer {
                        effects.push(SubscriptionEffect::Connect {
                            slave_id,
                            endpoint: conn.source_endpoint,
                        });
                    }
                    results.push(true);
                }
                VariableSetting::Disconnect(input) => {
                    if let Some(slave_id) = self.bus.disconnect(input) {
                        effects.push(SubscriptionEffect::DropPeer { slave_id });
                    }
                    results.push(true);
                }
            }
        }

        let all_ok = results.iter().all(|ok| *ok);
        let response = if all_ok {
            ControlMessage::SetVarsOk(SetVarsResultBody { results })
        } else {
            ControlMessage::SetVarsFail(SetVarsResultBody { results })
        };

        (response, effects)
    }

    /// Starts a step: §4.5 step 1. On `step_id == 0` this also gathers the
    /// start-time outputs to publish tagged `StepId(0)`, per the resolved
    /// step-0 convention (SPEC_FULL §9 / Q1). On later steps the outputs
    /// were already published at the end of the previous step, so nothing
    /// is returned here.
    pub fn begin_step(&mut self, body: &StepBody) -> Result<Vec<(VariableId, ScalarValue)>, ControlMessage> {
        if !self.phase.accepts_step() {
            return Err(self.denied(format!("STEP illegal in phase {:?}", self.phase)));
        }

        self.phase = SlavePhase::Stepping;
        self.bus.begin_step(body.step_id);

        if body.step_id == StepId::FIRST {
            Ok(self.collect_outputs())
        } else {
            Ok(Vec::new())
        }
    }

    fn collect_outputs(&self) -> Vec<(VariableId, ScalarValue)> {
        self.instance
            .type_description()
            .variables
            .iter()
            .filter(|v| v.causality == cosim_proto::model::Causality::Output)
            .map(|v| {
                let value = scalar::get(&*self.instance, v.id, v.data_type).unwrap_or(ScalarValue::Real(0.0));
                (v.id, value)
            })
            .collect()
    }

    /// Applies the barrier's collected inputs, steps the instance, and
    /// (on success) gathers the next publish batch tagged `step_id + 1`
    /// (§4.5 steps 2-5).
    pub fn finish_step(&mut self, current_t: TimePoint, step_size: TimeDuration) -> StepOutcome {
        for (input, value) in self.bus.collected().clone() {
            let _ = scalar::set(&mut *self.instance, input, value);
        }

        if !self.instance.do_step(current_t, step_size) {
            self.phase = SlavePhase::Ready;
            logging::warn!(self.log, "step failed"; "t" => current_t, "dt" => step_size);
            return StepOutcome {
                response: ControlMessage::StepFail(StepFailBody {
                    reason: "instance rejected the step".to_string(),
                }),
                publish: Vec::new(),
            };
        }

        self.phase = SlavePhase::Stepped;
        StepOutcome {
            response: ControlMessage::StepOk,
            publish: self.collect_outputs(),
        }
    }

    pub fn handle_accept_step(&mut self) -> ControlMessage {
        if !self.phase.accepts_accept_step() {
            return self.denied(format!("ACCEPT_STEP illegal in phase {:?}", self.phase));
        }
        self.phase = SlavePhase::Ready;
        ControlMessage::AcceptStepOk
    }

    pub fn handle_terminate(&mut self) {
        logging::info!(self.log, "terminating"; "slave" => %self.slave_name);
        let _ = self.instance.end_simulation();
        self.phase = SlavePhase::Terminated;
    }
}
