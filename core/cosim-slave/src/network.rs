//! Socket plumbing for the Slave Agent: a control REP listener (accepts the
//! one master connection), a PUB listener (accepts downstream subscribers),
//! and one outbound SUB connection per remote peer we're wired to. Grounded
//! on `neutronium::net::endpoint::Endpoint`'s accept/dispatch split, adapted
//! from Endpoint's three fixed polls sharing one connection table to three
//! independent roles sharing one `cosim_reactor::Reactor`.

use crate::core::{SlaveAgentCore, SubscriptionEffect};
use cosim_proto::control::{ControlMessage, PROTOCOL_VERSION};
use cosim_proto::model::SlaveId;
use cosim_proto::sample;
use cosim_reactor::{IoHandler, Reactor};
use cosim_support::logging::{self, Logger};
use mio::net::{TcpListener, TcpStream};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Shared = Rc<RefCell<SlaveAgentCore>>;
type Subscribers = Rc<RefCell<Vec<TcpStream>>>;

/// Runs the Slave Agent's reactor: binds the control and PUB listeners,
/// owns the shared state every handler dispatches through.
pub struct SlaveAgent {
    reactor: Reactor,
    core: Shared,
    pub_endpoint: String,
    control_endpoint: String,
}

impl SlaveAgent {
    pub fn bind(
        control_addr: &str,
        pub_addr: &str,
        slave_name: String,
        instance: Box<dyn cosim_model::Instance>,
        log: Logger,
    ) -> io::Result<SlaveAgent> {
        let mut reactor = Reactor::new(log.clone())?;

        let control_listener = TcpListener::bind(&control_addr.parse::<SocketAddr>().map_err(to_io_error)?)?;
        let control_endpoint = format!("tcp://{}", control_listener.local_addr()?);

        let pub_listener = TcpListener::bind(&pub_addr.parse::<SocketAddr>().map_err(to_io_error)?)?;
        let pub_endpoint = format!("tcp://{}", pub_listener.local_addr()?);

        let core: Shared = Rc::new(RefCell::new(SlaveAgentCore::new(slave_name, instance, log.clone())));
        let subscribers: Subscribers = Rc::new(RefCell::new(Vec::new()));

        reactor.register_io(Box::new(ControlListenerHandler {
            listener: control_listener,
            core: core.clone(),
            subscribers: subscribers.clone(),
            pub_endpoint: pub_endpoint.clone(),
            log: log.new(logging::o!("component" => "control-listener")),
        }))?;

        reactor.register_io(Box::new(PubListenerHandler {
            listener: pub_listener,
            subscribers,
        }))?;

        Ok(SlaveAgent {
            reactor,
            core,
            pub_endpoint,
            control_endpoint,
        })
    }

    pub fn control_endpoint(&self) -> &str {
        &self.control_endpoint
    }

    pub fn pub_endpoint(&self) -> &str {
        &self.pub_endpoint
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
}

fn to_io_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
}

/// Best-effort fan-out to every accepted PUB subscriber. A subscriber whose
/// write fails (buffer full, peer gone) is dropped rather than retried —
/// there is no write-readiness backpressure handling here, documented as a
/// simplification in DESIGN.md.
fn broadcast(subscribers: &Subscribers, message: &cosim_wire::message::Message) {
    let mut wire = cosim_wire::buffer::Buffer::new();
    cosim_wire::message::write_message(&mut wire, message);
    let mut bytes = Vec::new();
    let _ = wire.egress(&mut bytes);

    let mut subs = subscribers.borrow_mut();
    let mut alive = Vec::with_capacity(subs.len());
    for mut stream in subs.drain(..) {
        use std::io::Write;
        if stream.write_all(&bytes).is_ok() {
            alive.push(stream);
        }
    }
    *subs = alive;
}

struct ControlListenerHandler {
    listener: TcpListener,
    core: Shared,
    subscribers: Subscribers,
    pub_endpoint: String,
    log: Logger,
}

impl IoHandler for ControlListenerHandler {
    fn source(&mut self) -> &mut dyn mio::Evented {
        &mut self.listener
    }

    fn interest(&self) -> mio::Ready {
        mio::Ready::readable()
    }

    fn on_ready(&mut self, _readiness: mio::Ready, reactor: &mut Reactor) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let handler = Box::new(ControlConnHandler {
                        conn: cosim_wire::Connection::new(stream),
                        core: self.core.clone(),
                        subscribers: self.subscribers.clone(),
                        pub_endpoint: self.pub_endpoint.clone(),
                        sub_tokens: HashMap::new(),
                    });
                    if let Err(err) = reactor.register_io(handler) {
                        logging::error!(self.log, "failed to register control connection"; "error" => %err);
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

struct PubListenerHandler {
    listener: TcpListener,
    subscribers: Subscribers,
}

impl IoHandler for PubListenerHandler {
    fn source(&mut self) -> &mut dyn mio::Evented {
        &mut self.listener
    }

    fn interest(&self) -> mio::Ready {
        mio::Ready::readable()
    }

    fn on_ready(&mut self, _readiness: mio::Ready, _reactor: &mut Reactor) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => self.subscribers.borrow_mut().push(stream),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// The single connection to the master. Owns the REP socket directly;
/// dispatches every decoded `ControlMessage` through `SlaveAgentCore` and
/// acts on the subscription effects it returns (dialing or dropping SUB
/// peers) using the `reactor` handle it's given each call.
struct ControlConnHandler {
    conn: cosim_wire::Connection,
    core: Shared,
    subscribers: Subscribers,
    pub_endpoint: String,
    sub_tokens: HashMap<SlaveId, mio::Token>,
}

impl ControlConnHandler {
    fn apply_effects(&mut self, effects: Vec<SubscriptionEffect>, reactor: &mut Reactor) {
        for effect in effects {
            match effect {
                SubscriptionEffect::Connect { slave_id, endpoint } => {
                    if self.sub_tokens.contains_key(&slave_id) {
                        continue;
                    }
                    if let Some(addr) = strip_tcp_scheme(&endpoint) {
                        if let Ok(parsed) = addr.parse::<SocketAddr>() {
                            if let Ok(stream) = TcpStream::connect(&parsed) {
                                let handler = Box::new(SubHandler {
                                    conn: cosim_wire::Connection::new(stream),
                                    core: self.core.clone(),
                                });
                                if let Ok(token) = reactor.register_io(handler) {
                                    self.sub_tokens.insert(slave_id, token);
                                }
                            }
                        }
                    }
                }
                SubscriptionEffect::DropPeer { slave_id } => {
                    if let Some(token) = self.sub_tokens.remove(&slave_id) {
                        let _ = reactor.deregister_io(token);
                    }
                }
            }
        }
    }

    fn publish(&self, samples: Vec<(cosim_proto::model::VariableId, cosim_proto::model::ScalarValue)>, step_id: cosim_proto::model::StepId) {
        let slave_id = match self.core.borrow().slave_id() {
            Some(id) => id,
            None => return,
        };

        for (variable, value) in samples {
            let source = cosim_proto::model::VariableRef::new(slave_id, variable);
            let message = sample::encode_sample(source, step_id, &value);
            broadcast(&self.subscribers, &message);
        }
    }
}

impl IoHandler for ControlConnHandler {
    fn source(&mut self) -> &mut dyn mio::Evented {
        self.conn.stream_mut()
    }

    fn interest(&self) -> mio::Ready {
        mio::Ready::readable() | mio::Ready::writable()
    }

    fn on_ready(&mut self, readiness: mio::Ready, reactor: &mut Reactor) {
        if readiness.is_readable() {
            if self.conn.fill().is_err() {
                return;
            }

            while let Ok(Some(message)) = self.conn.try_recv() {
                self.dispatch(&message, reactor);
            }
        }

        if readiness.is_writable() {
            let _ = self.conn.flush();
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl ControlConnHandler {
    fn dispatch(&mut self, message: &cosim_wire::message::Message, reactor: &mut Reactor) {
        let (version, control_message) = match ControlMessage::decode(message) {
            Ok(parsed) => parsed,
            Err(_) => return,
        };

        let response = match control_message {
            ControlMessage::Hello(body) => Some(self.core.borrow_mut().handle_hello(version, body, self.pub_endpoint.clone())),
            ControlMessage::Setup(body) => {
                let execution_name = body.options.execution_name.clone();
                let start_time = body.options.start_time;
                let stop_time = body.options.stop_time;
                self.core
                    .borrow_mut()
                    .handle_setup(body.assigned_slave_id, &execution_name, start_time, stop_time, body.options)
                    .ok()
            }
            ControlMessage::SetVars(body) => {
                let (response, effects) = self.core.borrow_mut().handle_set_vars(body);
                self.apply_effects(effects, reactor);
                Some(response)
            }
            ControlMessage::Step(body) => Some(self.run_step(body, reactor)),
            ControlMessage::AcceptStep => Some(self.core.borrow_mut().handle_accept_step()),
            ControlMessage::Terminate => {
                self.core.borrow_mut().handle_terminate();
                reactor.stop();
                None
            }
            _ => None,
        };

        if let Some(response) = response {
            self.conn.enqueue(&response.encode(PROTOCOL_VERSION));
            let _ = self.conn.flush();
        }
    }

    /// Drives one `STEP` to completion (spec.md §4.3/§4.5): publish the
    /// step-0 outputs if any, then wait for the variable barrier to fill in
    /// while letting the reactor keep servicing every other registered
    /// handler — in particular the `SubHandler`s that feed the barrier.
    ///
    /// `reactor.run_once()` is safe to call reentrantly here because the
    /// outer `Reactor::run_once` temporarily removes this handler from its
    /// socket table for the duration of this call (see `cosim-reactor`'s
    /// `run_once`), so the nested call only ever dispatches *other* handlers.
    /// This assumes the master does not pipeline a second control message
    /// while a `STEP` is outstanding, which matches spec.md §4.5's
    /// one-in-flight-operation protocol.
    fn run_step(&mut self, body: cosim_proto::control::StepBody, reactor: &mut Reactor) -> ControlMessage {
        let step_id = body.step_id;

        let publish = match self.core.borrow_mut().begin_step(&body) {
            Ok(publish) => publish,
            Err(denied) => return denied,
        };
        self.publish(publish, step_id);

        let wait = Duration::from_millis(body.deadline_ms.max(1));
        let deadline = Instant::now() + wait;
        reactor.register_timeout(wait, |_r| {});

        while !self.core.borrow().bus_is_complete() && Instant::now() < deadline {
            reactor.run_once();
        }

        if self.core.borrow().bus_is_complete() {
            let outcome = self.core.borrow_mut().finish_step(body.current_t, body.step_size);
            self.publish(outcome.publish, step_id.next());
            outcome.response
        } else {
            self.core.borrow_mut().timeout_step()
        }
    }
}

/// One outbound connection to a remote slave's PUB endpoint. Parses every
/// incoming sample and feeds it to the bus's barrier.
struct SubHandler {
    conn: cosim_wire::Connection,
    core: Shared,
}

impl IoHandler for SubHandler {
    fn source(&mut self) -> &mut dyn mio::Evented {
        self.conn.stream_mut()
    }

    fn interest(&self) -> mio::Ready {
        mio::Ready::readable()
    }

    fn on_ready(&mut self, _readiness: mio::Ready, _reactor: &mut Reactor) {
        if self.conn.fill().is_err() {
            return;
        }

        while let Ok(Some(message)) = self.conn.try_recv() {
            if let Ok((source, step_id, value)) = sample::decode_sample(&message) {
                self.core.borrow_mut().bus().ingest_sample(source, step_id, value);
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn strip_tcp_scheme(endpoint: &str) -> Option<&str> {
    endpoint.strip_prefix("tcp://")
}
