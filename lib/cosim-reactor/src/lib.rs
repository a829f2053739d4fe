//! Single-threaded cooperative event loop (spec.md §4.2). Grounded on
//! `neutronium::net::endpoint::Endpoint::sync`'s poll-dispatch-housekeeping
//! loop, generalized from Endpoint's fixed three-poll/channel-table design
//! to an open set of registered sockets and timers sharing one `mio::Poll`.

mod handle;
mod io;
mod timer;

pub use handle::Handle;
pub use io::IoHandler;
pub use timer::TimerId;

use cosim_support::logging::{self, Logger};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use timer::TimerEntry;

const QUEUE_TOKEN: mio::Token = mio::Token(usize::max_value());

type PostedJob = Box<dyn FnOnce(&mut Reactor) + Send>;

/// The reactor thread's event loop. All handler callbacks, timer callbacks,
/// and posted jobs run here — there is never concurrent access to the
/// handlers or timers, matching spec.md §5's "no shared-state locking
/// because there is no concurrent access".
pub struct Reactor {
    poll: mio::Poll,
    events: mio::Events,

    sockets: HashMap<mio::Token, Box<dyn IoHandler>>,
    next_token: usize,

    timers: BinaryHeap<TimerEntry>,
    cancelled: HashSet<u64>,
    next_timer_id: u64,

    queue_tx: mpsc::Sender<PostedJob>,
    queue_rx: mpsc::Receiver<PostedJob>,
    queue_set_readiness: mio::SetReadiness,
    _queue_registration: mio::Registration,

    running: bool,
    log: Logger,
}

impl Reactor {
    pub fn new(log: Logger) -> std::io::Result<Reactor> {
        let poll = mio::Poll::new()?;
        let (registration, set_readiness) = mio::Registration::new2();
        poll.register(
            &registration,
            QUEUE_TOKEN,
            mio::Ready::readable(),
            mio::PollOpt::edge(),
        )?;

        let (queue_tx, queue_rx) = mpsc::channel();

        Ok(Reactor {
            poll,
            events: mio::Events::with_capacity(4096),
            sockets: HashMap::new(),
            next_token: 0,
            timers: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_timer_id: 0,
            queue_tx,
            queue_rx,
            queue_set_readiness: set_readiness,
            _queue_registration: registration,
            running: false,
            log: log.new(logging::o!("component" => "reactor")),
        })
    }

    /// A cloneable handle that lets another thread post a completion back
    /// onto this reactor, per spec.md §4.2/§5: "any blocking work must be
    /// pushed to a helper thread that posts completion back via a self-pipe
    /// or equivalent". Here the "self-pipe" is a `mio::Registration` plus an
    /// `mpsc::Sender` of boxed closures.
    pub fn handle(&self) -> Handle {
        Handle::new(self.queue_tx.clone(), self.queue_set_readiness.clone())
    }

    pub fn register_io(&mut self, mut handler: Box<dyn IoHandler>) -> std::io::Result<mio::Token> {
        let token = mio::Token(self.next_token);
        self.next_token += 1;

        self.poll
            .register(handler.source(), token, handler.interest(), mio::PollOpt::edge())?;
        self.sockets.insert(token, handler);

        logging::trace!(self.log, "registered io handler"; "token" => token.0);
        Ok(token)
    }

    pub fn reregister_io(&mut self, token: mio::Token) -> std::io::Result<()> {
        if let Some(handler) = self.sockets.get_mut(&token) {
            self.poll
                .reregister(handler.source(), token, handler.interest(), mio::PollOpt::edge())?;
        }
        Ok(())
    }

    pub fn deregister_io(&mut self, token: mio::Token) -> std::io::Result<()> {
        if let Some(mut handler) = self.sockets.remove(&token) {
            self.poll.deregister(handler.source())?;
            logging::trace!(self.log, "deregistered io handler"; "token" => token.0);
        }
        Ok(())
    }

    /// Lets a caller outside the reactor's own dispatch loop reach a handler
    /// it registered earlier and knows the concrete type of, via
    /// `IoHandler::as_any_mut` + `downcast_mut` (used by the Execution
    /// Manager to push a new request onto an already-open `SlaveConnHandler`).
    pub fn get_handler_mut(&mut self, token: mio::Token) -> Option<&mut Box<dyn IoHandler>> {
        self.sockets.get_mut(&token)
    }

    /// Registers a timer firing at `deadline`. Returns a [`TimerId`] that
    /// can later be passed to [`Reactor::cancel_timer`].
    pub fn register_timer<F>(&mut self, deadline: Instant, callback: F) -> TimerId
    where
        F: FnMut(&mut Reactor) + 'static,
    {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;

        self.timers.push(TimerEntry {
            deadline,
            id,
            callback: Box::new(callback),
        });

        id
    }

    pub fn register_timeout<F>(&mut self, delay: Duration, callback: F) -> TimerId
    where
        F: FnMut(&mut Reactor) + 'static,
    {
        self.register_timer(Instant::now() + delay, callback)
    }

    /// A timer that has already fired but not yet been dispatched is
    /// suppressed, per spec.md §4.2 — the `cancelled` set is checked right
    /// before invoking the callback, not at cancel time.
    pub fn cancel_timer(&mut self, id: TimerId) {
        self.cancelled.insert(id.0);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Blocks until `stop()` is called from inside a callback.
    pub fn run(&mut self) {
        self.running = true;

        while self.running {
            self.run_once();
        }
    }

    /// Runs a single iteration: poll until the next timer deadline or a
    /// socket readiness event, then dispatch. Exposed separately from
    /// `run` so tests can drive the loop deterministically.
    pub fn run_once(&mut self) {
        let timeout = self.timers.peek().map(|entry| {
            let now = Instant::now();
            if entry.deadline > now {
                entry.deadline - now
            } else {
                Duration::from_secs(0)
            }
        });

        if let Err(err) = self.poll.poll(&mut self.events, timeout) {
            logging::error!(self.log, "poll failed"; "error" => %err);
            return;
        }

        let ready: Vec<(mio::Token, mio::Ready)> =
            self.events.iter().map(|event| (event.token(), event.readiness())).collect();

        for (token, readiness) in ready {
            if token == QUEUE_TOKEN {
                self.drain_queue();
                continue;
            }

            if let Some(mut handler) = self.sockets.remove(&token) {
                handler.on_ready(readiness, self);
                self.sockets.insert(token, handler);
            }
        }

        self.dispatch_expired_timers();
    }

    fn drain_queue(&mut self) {
        while let Ok(job) = self.queue_rx.try_recv() {
            job(self);
        }
    }

    fn dispatch_expired_timers(&mut self) {
        let now = Instant::now();

        loop {
            let is_due = matches!(self.timers.peek(), Some(entry) if entry.deadline <= now);
            if !is_due {
                break;
            }

            let mut entry = self.timers.pop().expect("checked is_due above");

            if self.cancelled.remove(&entry.id.0) {
                continue;
            }

            (entry.callback)(self);
        }
    }
}
