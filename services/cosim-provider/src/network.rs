//! Socket plumbing for the provider: one listener accepting requests over
//! the same request/response transport as the execution control plane.
//! Grounded on `cosim_slave::network::ControlListenerHandler`/
//! `ControlConnHandler`'s accept-then-dispatch shape, trimmed down to a
//! single connection role since a provider has no PUB/SUB side of its own.

use crate::core::{ProviderConfig, ProviderCore};
use cosim_proto::provider::{GetSlaveTypesOkBody, InstantiateFailBody, InstantiateOkBody, ProviderMessage, PROVIDER_PROTOCOL_VERSION};
use cosim_reactor::{IoHandler, Reactor};
use cosim_support::logging::{self, Logger};
use mio::net::TcpListener;
use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

type Shared = Rc<RefCell<ProviderCore>>;

/// Runs the provider's reactor: binds the listener, owns the shared
/// directory every connection dispatches through.
pub struct ProviderAgent {
    reactor: Reactor,
    core: Shared,
    listen_endpoint: String,
}

impl ProviderAgent {
    pub fn bind(listen_addr: &str, config: ProviderConfig, log: Logger) -> io::Result<ProviderAgent> {
        let mut reactor = Reactor::new(log.clone())?;

        let listener = TcpListener::bind(&listen_addr.parse::<SocketAddr>().map_err(to_io_error)?)?;
        let listen_endpoint = format!("tcp://{}", listener.local_addr()?);

        let core: Shared = Rc::new(RefCell::new(ProviderCore::new(config, log.clone())));

        reactor.register_io(Box::new(ProviderListenerHandler {
            listener,
            core: core.clone(),
            log: log.new(logging::o!("component" => "provider-listener")),
        }))?;

        Ok(ProviderAgent { reactor, core, listen_endpoint })
    }

    pub fn listen_endpoint(&self) -> &str {
        &self.listen_endpoint
    }

    pub fn core(&self) -> &Shared {
        &self.core
    }

    /// Pumps the reactor once, then reaps any spawned children that have
    /// already exited.
    pub fn run_once(&mut self) {
        self.reactor.run_once();
        self.core.borrow_mut().reap_finished();
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

struct ProviderListenerHandler {
    listener: TcpListener,
    core: Shared,
    log: Logger,
}

impl IoHandler for ProviderListenerHandler {
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
                    let handler = Box::new(ProviderConnHandler {
                        conn: cosim_wire::Connection::new(stream),
                        core: self.core.clone(),
                    });
                    if let Err(err) = reactor.register_io(handler) {
                        logging::error!(self.log, "failed to register provider connection"; "error" => %err);
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

/// One inbound connection from a master or CLI tool. Each request gets
/// exactly one reply, matching the REQ/REP shape `control.rs` uses.
struct ProviderConnHandler {
    conn: cosim_wire::Connection,
    core: Shared,
}

impl IoHandler for ProviderConnHandler {
    fn source(&mut self) -> &mut dyn mio::Evented {
        self.conn.stream_mut()
    }

    fn interest(&self) -> mio::Ready {
        mio::Ready::readable() | mio::Ready::writable()
    }

    fn on_ready(&mut self, readiness: mio::Ready, _reactor: &mut Reactor) {
        if readiness.is_readable() {
            if self.conn.fill().is_err() {
                return;
            }
            while let Ok(Some(message)) = self.conn.try_recv() {
                self.dispatch(&message);
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

impl ProviderConnHandler {
    fn dispatch(&mut self, message: &cosim_wire::message::Message) {
        let request = match ProviderMessage::decode(message) {
            Ok((_version, parsed)) => parsed,
            Err(_) => return,
        };

        let response = match request {
            ProviderMessage::GetSlaveTypes => {
                ProviderMessage::GetSlaveTypesOk(GetSlaveTypesOkBody { slave_types: self.core.borrow().descriptions() })
            }
            ProviderMessage::Instantiate(body) => match self.core.borrow_mut().instantiate(&body.slave_type_uuid, &body.instance_name) {
                Ok(control_endpoint) => ProviderMessage::InstantiateOk(InstantiateOkBody { control_endpoint }),
                Err(reason) => ProviderMessage::InstantiateFail(InstantiateFailBody { reason }),
            },
            _ => return,
        };

        self.conn.enqueue(&response.encode(PROVIDER_PROTOCOL_VERSION));
        let _ = self.conn.flush();
    }
}
