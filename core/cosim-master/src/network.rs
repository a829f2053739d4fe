//! Socket plumbing for the Execution Manager: one outbound control
//! connection per admitted slave, each driven through a queue of pending
//! continuations. Grounded on `cosim_slave::network::ControlConnHandler`'s
//! dispatch-on-`conn` shape, turned around for the other side of the same
//! REQ/REP protocol: instead of replying to one inbound request, each
//! connection here issues a request and waits for exactly one reply before
//! its next one, per the strict per-(master, slave)-pair FIFO ordering
//! spec.md §5 relies on.
//!
//! Every public operation on [`ExecutionManager`] returns immediately after
//! queuing its requests; completion is reported through callbacks, never by
//! blocking the reactor thread (spec.md §5) — unlike the slave's `STEP`
//! handling, which legitimately pumps the reactor reentrantly while waiting
//! on its own variable barrier.

use crate::error::ExecutionError;
use crate::manager::ExecutionManagerCore;
use crate::record::RecordPhase;
use crate::rendezvous::{Rendezvous, SharedRendezvous};
use cosim_proto::config::ExecutionOptions;
use cosim_proto::control::{ControlMessage, HelloBody, SetVarsBody, SetupBody, StepBody, PROTOCOL_VERSION};
use cosim_proto::model::{SlaveId, TimeDuration, VariableConnection, VariableSetting};
use cosim_reactor::{IoHandler, Reactor};
use cosim_support::logging::{self, Logger};
use mio::net::TcpStream;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

type Shared = Rc<RefCell<ExecutionManagerCore>>;
type TokenTable = Rc<RefCell<HashMap<SlaveId, mio::Token>>>;
type PerSlaveCallback = Rc<RefCell<dyn FnMut(&str, Result<SlaveId, ExecutionError>)>>;
type Continuation = Box<dyn FnOnce(&mut SlaveConnHandler, &mut Reactor, ControlMessage)>;

/// Drives the Execution Manager's reactor. Holds the pure-logic
/// `ExecutionManagerCore` behind an `Rc<RefCell<_>>` so connection handlers
/// and the public API both reach it.
pub struct ExecutionManager {
    reactor: Reactor,
    core: Shared,
    tokens: TokenTable,
    log: Logger,
    /// The rendezvous of whichever operation is currently outstanding, if
    /// any. `terminate()` aborts it immediately instead of letting it run
    /// to its own deadline (spec.md §8 B4).
    current_op: Option<SharedRendezvous>,
}

impl ExecutionManager {
    pub fn new(options: ExecutionOptions, log: Logger) -> io::Result<ExecutionManager> {
        let reactor = Reactor::new(log.clone())?;
        let core = ExecutionManagerCore::new(options, log.clone()).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(ExecutionManager {
            reactor,
            core: Rc::new(RefCell::new(core)),
            tokens: Rc::new(RefCell::new(HashMap::new())),
            log: log.new(logging::o!("component" => "execution-manager")),
            current_op: None,
        })
    }

    pub fn core(&self) -> &Shared {
        &self.core
    }

    pub fn run_once(&mut self) {
        self.reactor.run_once();
    }

    pub fn run(&mut self) {
        self.reactor.run();
    }

    pub fn stop(&mut self) {
        self.reactor.stop();
    }

    /// Connects to each target, runs it through `HELLO` -> `HELLO_ACK` ->
    /// `SETUP`, and reports each outcome via `on_per_slave` as it resolves.
    /// `on_complete` fires once every target has reported in or the
    /// operation's timeout expires (spec.md §4.6).
    pub fn reconstitute(
        &mut self,
        targets: Vec<(String, String)>,
        timeout_ms: u64,
        on_per_slave: PerSlaveCallback,
        on_complete: Box<dyn FnOnce(Result<(), ExecutionError>)>,
    ) {
        let rendezvous = Rendezvous::new(targets.len(), on_complete);
        self.current_op = Some(rendezvous.clone());
        self.arm_timeout(timeout_ms, rendezvous.clone());

        for (name, endpoint) in targets {
            self.connect_one(name, endpoint, rendezvous.clone(), on_per_slave.clone());
        }
    }

    fn connect_one(&mut self, name: String, control_endpoint: String, rendezvous: SharedRendezvous, on_per_slave: PerSlaveCallback) {
        if let Err(err) = self.core.borrow().check_name_unique(&name) {
            on_per_slave.borrow_mut()(&name, Err(err.clone()));
            Rendezvous::decrement(&rendezvous, Err(err), &mut self.reactor);
            return;
        }

        let addr = match control_endpoint.strip_prefix("tcp://").and_then(|a| a.parse::<SocketAddr>().ok()) {
            Some(addr) => addr,
            None => {
                let err = ExecutionError::InputError(format!("malformed control endpoint {:?}", control_endpoint));
                on_per_slave.borrow_mut()(&name, Err(err.clone()));
                Rendezvous::decrement(&rendezvous, Err(err), &mut self.reactor);
                return;
            }
        };

        let stream = match TcpStream::connect(&addr) {
            Ok(stream) => stream,
            Err(_) => {
                logging::warn!(self.log, "failed to connect to slave"; "name" => %name, "endpoint" => %control_endpoint);
                let err = ExecutionError::Lost;
                on_per_slave.borrow_mut()(&name, Err(err.clone()));
                Rendezvous::decrement(&rendezvous, Err(err), &mut self.reactor);
                return;
            }
        };

        let token_cell = Rc::new(Cell::new(None));
        let handler = Box::new(SlaveConnHandler {
            conn: cosim_wire::Connection::new(stream),
            slave_id: None,
            token_cell: token_cell.clone(),
            pending: VecDeque::new(),
        });

        let token = match self.reactor.register_io(handler) {
            Ok(token) => token,
            Err(_) => {
                let err = ExecutionError::Lost;
                on_per_slave.borrow_mut()(&name, Err(err.clone()));
                Rendezvous::decrement(&rendezvous, Err(err), &mut self.reactor);
                return;
            }
        };
        token_cell.set(Some(token));

        let execution_name = self.core.borrow().options().execution_name.clone();
        let core = self.core.clone();
        let tokens = self.tokens.clone();
        let endpoint_for_admit = control_endpoint;
        let name_for_ack = name.clone();

        let on_hello_ack: Continuation = Box::new(move |handler, reactor, response| match response {
            ControlMessage::HelloAck(ack) => {
                let slave_id = core
                    .borrow_mut()
                    .admit(name_for_ack.clone(), endpoint_for_admit.clone(), ack.pub_endpoint, ack.description);
                handler.slave_id = Some(slave_id);
                tokens.borrow_mut().insert(slave_id, handler.token());

                let options = core.borrow().options().clone();
                let core2 = core.clone();
                let rendezvous2 = rendezvous.clone();
                let on_per_slave2 = on_per_slave.clone();
                let name2 = name_for_ack.clone();

                let on_setup_reply: Continuation = Box::new(move |_handler, reactor, response| match response {
                    ControlMessage::StepOk => {
                        on_per_slave2.borrow_mut()(&name2, Ok(slave_id));
                        Rendezvous::decrement(&rendezvous2, Ok(()), reactor);
                    }
                    ControlMessage::Denied(body) => {
                        core2.borrow_mut().mark_lost(slave_id, &body.reason);
                        let err = ExecutionError::ProtocolViolation(body.reason);
                        on_per_slave2.borrow_mut()(&name2, Err(err.clone()));
                        Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                    }
                    _ => {
                        let err = ExecutionError::ProtocolViolation("unexpected reply to SETUP".into());
                        on_per_slave2.borrow_mut()(&name2, Err(err.clone()));
                        Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                    }
                });

                handler.send(ControlMessage::Setup(SetupBody { assigned_slave_id: slave_id, options }), on_setup_reply);
            }
            ControlMessage::Denied(body) => {
                let err = ExecutionError::ProtocolViolation(body.reason);
                on_per_slave.borrow_mut()(&name_for_ack, Err(err.clone()));
                Rendezvous::decrement(&rendezvous, Err(err), reactor);
            }
            _ => {
                let err = ExecutionError::ProtocolViolation("unexpected reply to HELLO".into());
                on_per_slave.borrow_mut()(&name_for_ack, Err(err.clone()));
                Rendezvous::decrement(&rendezvous, Err(err), reactor);
            }
        });

        if let Some(handler) = self.handler_mut(token) {
            handler.send(ControlMessage::Hello(HelloBody { execution_name }), on_hello_ack);
        }
    }

    /// Resolves and validates each connection (I3) before sending anything,
    /// then fans `SET_VARS` out to every named target in parallel. A slave
    /// referenced by a setting but not currently reachable fails that one
    /// slave's outcome without blocking the others (spec.md §4.6).
    pub fn reconfigure(
        &mut self,
        settings_by_slave: Vec<(SlaveId, Vec<VariableSetting>)>,
        timeout_ms: u64,
        on_per_slave: PerSlaveCallback,
        on_complete: Box<dyn FnOnce(Result<(), ExecutionError>)>,
    ) {
        let rendezvous = Rendezvous::new(settings_by_slave.len(), on_complete);
        self.current_op = Some(rendezvous.clone());
        self.arm_timeout(timeout_ms, rendezvous.clone());

        for (slave_id, settings) in settings_by_slave {
            let resolved = settings
                .into_iter()
                .map(|setting| self.resolve_setting(setting))
                .collect::<Result<Vec<_>, ExecutionError>>();

            let settings = match resolved {
                Ok(settings) => settings,
                Err(err) => {
                    self.report_name(slave_id, &on_per_slave, Err(err.clone()));
                    Rendezvous::decrement(&rendezvous, Err(err), &mut self.reactor);
                    continue;
                }
            };

            let rendezvous2 = rendezvous.clone();
            let on_per_slave2 = on_per_slave.clone();
            let core = self.core.clone();

            let continuation: Continuation = Box::new(move |_handler, reactor, response| match response {
                ControlMessage::SetVarsOk(_) => {
                    report_by_id(&core, slave_id, &on_per_slave2, Ok(()));
                    Rendezvous::decrement(&rendezvous2, Ok(()), reactor);
                }
                ControlMessage::SetVarsFail(body) => {
                    let failed = body.results.iter().filter(|ok| !**ok).count();
                    let err = ExecutionError::InputError(format!("{} setting(s) rejected", failed));
                    report_by_id(&core, slave_id, &on_per_slave2, Err(err.clone()));
                    Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                }
                _ => {
                    let err = ExecutionError::ProtocolViolation("unexpected reply to SET_VARS".into());
                    report_by_id(&core, slave_id, &on_per_slave2, Err(err.clone()));
                    Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                }
            });

            if let Err(err) = self.send_to(slave_id, ControlMessage::SetVars(SetVarsBody { settings }), continuation) {
                self.report_name(slave_id, &on_per_slave, Err(err.clone()));
                Rendezvous::decrement(&rendezvous, Err(err), &mut self.reactor);
            }
        }
    }

    /// I3: rejects a `Connect` whose source is not a known slave/output
    /// before anything is sent, and stamps the resolved data endpoint onto
    /// the wire setting (a Slave Agent has no directory of its own).
    fn resolve_setting(&self, setting: VariableSetting) -> Result<VariableSetting, ExecutionError> {
        match setting {
            VariableSetting::Connect(VariableConnection { input, source, .. }) => {
                let endpoint = self.core.borrow().resolve_connect_source(source)?;
                Ok(VariableSetting::Connect(VariableConnection {
                    input,
                    source,
                    source_endpoint: endpoint,
                }))
            }
            other => Ok(other),
        }
    }

    /// Issues `STEP` to every currently active slave and completes once
    /// every one has replied `STEP_OK`/`STEP_FAIL` or `timeout_ms` passes.
    /// On success, advances `current_t`/`step_id` (P2) before invoking the
    /// caller's `on_complete`. Each slave's individual outcome is also
    /// reported through `on_slave_step` as it resolves (spec.md §4.6).
    pub fn step(
        &mut self,
        step_size: TimeDuration,
        timeout_ms: u64,
        on_complete: Box<dyn FnOnce(Result<(), ExecutionError>)>,
        on_slave_step: PerSlaveCallback,
    ) {
        let (current_t, step_id) = self.core.borrow_mut().begin_step();
        let targets = self.core.borrow().active_slave_ids();

        let core_for_complete = self.core.clone();
        let wrapped_complete: Box<dyn FnOnce(Result<(), ExecutionError>)> = Box::new(move |result| {
            if result.is_ok() {
                core_for_complete.borrow_mut().complete_step(step_size);
            }
            on_complete(result);
        });

        let rendezvous = Rendezvous::new(targets.len(), wrapped_complete);
        self.current_op = Some(rendezvous.clone());
        self.arm_step_timeout(timeout_ms, targets.clone(), rendezvous.clone());

        for slave_id in targets {
            let core = self.core.clone();
            let rendezvous2 = rendezvous.clone();
            let on_slave_step2 = on_slave_step.clone();

            let continuation: Continuation = Box::new(move |_handler, reactor, response| match response {
                ControlMessage::StepOk => {
                    core.borrow_mut().record_step_result(slave_id, true);
                    report_by_id(&core, slave_id, &on_slave_step2, Ok(()));
                    Rendezvous::decrement(&rendezvous2, Ok(()), reactor);
                }
                ControlMessage::StepFail(body) => {
                    core.borrow_mut().record_step_result(slave_id, false);
                    let err = ExecutionError::StepFailed(body.reason);
                    report_by_id(&core, slave_id, &on_slave_step2, Err(err.clone()));
                    Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                }
                _ => {
                    core.borrow_mut().record_step_result(slave_id, false);
                    let err = ExecutionError::ProtocolViolation("unexpected reply to STEP".into());
                    report_by_id(&core, slave_id, &on_slave_step2, Err(err.clone()));
                    Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                }
            });

            let body = StepBody {
                current_t,
                step_size,
                step_id,
                deadline_ms: timeout_ms.max(1),
            };

            if self.send_to(slave_id, ControlMessage::Step(body), continuation).is_err() {
                self.core.borrow_mut().mark_lost(slave_id, "connection lost before STEP");
                report_by_id(&self.core, slave_id, &on_slave_step, Err(ExecutionError::Lost));
                Rendezvous::decrement(&rendezvous, Err(ExecutionError::Lost), &mut self.reactor);
            }
        }
    }

    /// Fans `ACCEPT_STEP` out to every active slave; completion advances the
    /// Execution Manager to `StepAccepted` (spec.md §4.3). Each slave's
    /// individual outcome is also reported through `on_slave_accept`.
    pub fn accept_step(&mut self, timeout_ms: u64, on_complete: Box<dyn FnOnce(Result<(), ExecutionError>)>, on_slave_accept: PerSlaveCallback) {
        let targets = self.core.borrow().active_slave_ids();
        let rendezvous = Rendezvous::new(targets.len(), on_complete);
        self.current_op = Some(rendezvous.clone());
        self.arm_timeout(timeout_ms, rendezvous.clone());

        for slave_id in targets {
            let core = self.core.clone();
            let rendezvous2 = rendezvous.clone();
            let on_slave_accept2 = on_slave_accept.clone();

            let continuation: Continuation = Box::new(move |_handler, reactor, response| match response {
                ControlMessage::AcceptStepOk => {
                    core.borrow_mut().record_accept_step(slave_id);
                    report_by_id(&core, slave_id, &on_slave_accept2, Ok(()));
                    Rendezvous::decrement(&rendezvous2, Ok(()), reactor);
                }
                _ => {
                    let err = ExecutionError::ProtocolViolation("unexpected reply to ACCEPT_STEP".into());
                    report_by_id(&core, slave_id, &on_slave_accept2, Err(err.clone()));
                    Rendezvous::decrement(&rendezvous2, Err(err), reactor);
                }
            });

            if self.send_to(slave_id, ControlMessage::AcceptStep, continuation).is_err() {
                report_by_id(&self.core, slave_id, &on_slave_accept, Err(ExecutionError::Lost));
                Rendezvous::decrement(&rendezvous, Err(ExecutionError::Lost), &mut self.reactor);
            }
        }

        self.core.borrow_mut().complete_accept_step();
    }

    /// Fires `TERMINATE` at every active slave and doesn't wait for a reply
    /// (spec.md §4.6, "no rendezvous — the execution is tearing down
    /// regardless of whether every slave acknowledges in time"). Per spec.md
    /// §8 B4, any operation still in flight is aborted immediately instead
    /// of being left to time out on its own.
    pub fn terminate(&mut self) {
        let targets = self.core.borrow().active_slave_ids();
        for slave_id in targets {
            let _ = self.send_to(slave_id, ControlMessage::Terminate, Box::new(|_, _, _| {}));
        }
        self.core.borrow_mut().terminate_all();

        if let Some(rendezvous) = self.current_op.take() {
            Rendezvous::abort(&rendezvous, &mut self.reactor);
        }
    }

    fn arm_timeout(&mut self, timeout_ms: u64, rendezvous: SharedRendezvous) {
        let wait = Duration::from_millis(timeout_ms.max(1));
        let rendezvous_for_timer = rendezvous.clone();
        let timer = self.reactor.register_timeout(wait, move |_reactor| {
            Rendezvous::expire(&rendezvous_for_timer);
        });
        Rendezvous::set_timer(&rendezvous, timer);
    }

    /// Like `arm_timeout`, but additionally marks every target that hasn't
    /// reported `STEP_OK`/`STEP_FAIL` by the deadline as `Lost` (spec.md
    /// §8 S2: a slave that doesn't reply in time is dropped from the
    /// execution, not just missing from this one step's result). A
    /// rendezvous that completes before the deadline cancels this timer
    /// (spec.md §5), so the mark-lost loop below never runs against slaves
    /// that have already moved past this step.
    fn arm_step_timeout(&mut self, timeout_ms: u64, targets: Vec<SlaveId>, rendezvous: SharedRendezvous) {
        let wait = Duration::from_millis(timeout_ms.max(1));
        let core = self.core.clone();
        let rendezvous_for_timer = rendezvous.clone();
        let timer = self.reactor.register_timeout(wait, move |_reactor| {
            {
                let mut core = core.borrow_mut();
                for slave_id in &targets {
                    let stepped = core.record(*slave_id).map_or(true, |record| record.phase == RecordPhase::Stepped);
                    if !stepped {
                        core.mark_lost(*slave_id, "did not reply to STEP before deadline");
                    }
                }
            }
            Rendezvous::expire(&rendezvous_for_timer);
        });
        Rendezvous::set_timer(&rendezvous, timer);
    }

    fn handler_mut(&mut self, token: mio::Token) -> Option<&mut SlaveConnHandler> {
        self.reactor.get_handler_mut(token)?.as_any_mut().downcast_mut::<SlaveConnHandler>()
    }

    fn send_to(&mut self, slave_id: SlaveId, message: ControlMessage, continuation: Continuation) -> Result<(), ExecutionError> {
        let token = *self.tokens.borrow().get(&slave_id).ok_or(ExecutionError::Lost)?;
        let handler = self.handler_mut(token).ok_or(ExecutionError::Lost)?;
        handler.send(message, continuation);
        Ok(())
    }

    fn report_name(&self, slave_id: SlaveId, on_per_slave: &PerSlaveCallback, outcome: Result<(), ExecutionError>) {
        report_by_id(&self.core, slave_id, on_per_slave, outcome);
    }
}

fn report_by_id(core: &Shared, slave_id: SlaveId, on_per_slave: &PerSlaveCallback, outcome: Result<(), ExecutionError>) {
    let name = core.borrow().record(slave_id).map(|record| record.name.clone()).unwrap_or_default();
    on_per_slave.borrow_mut()(&name, outcome.map(|_| slave_id));
}

/// One outbound control connection to an admitted (or admitting) slave.
/// Requests are issued strictly one at a time per the REQ/REP protocol;
/// `pending` holds the continuation for each in-flight request in the order
/// issued, so the next reply off the wire always matches the oldest one.
pub struct SlaveConnHandler {
    conn: cosim_wire::Connection,
    slave_id: Option<SlaveId>,
    token_cell: Rc<Cell<Option<mio::Token>>>,
    pending: VecDeque<Continuation>,
}

impl SlaveConnHandler {
    fn token(&self) -> mio::Token {
        self.token_cell.get().expect("handler reachable only after registration")
    }

    fn send(&mut self, message: ControlMessage, continuation: Continuation) {
        self.conn.enqueue(&message.encode(PROTOCOL_VERSION));
        let _ = self.conn.flush();
        self.pending.push_back(continuation);
    }
}

impl IoHandler for SlaveConnHandler {
    fn source(&mut self) -> &mut dyn mio::Evented {
        self.conn.stream_mut()
    }

    fn interest(&self) -> mio::Ready {
        mio::Ready::readable() | mio::Ready::writable()
    }

    fn on_ready(&mut self, readiness: mio::Ready, reactor: &mut Reactor) {
        if readiness.is_writable() {
            let _ = self.conn.flush();
        }

        if readiness.is_readable() {
            if self.conn.fill().is_err() {
                return;
            }

            while let Ok(Some(message)) = self.conn.try_recv() {
                let control_message = match ControlMessage::decode(&message) {
                    Ok((_, parsed)) => parsed,
                    Err(_) => continue,
                };

                if let Some(continuation) = self.pending.pop_front() {
                    continuation(self, reactor, control_message);
                }
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
