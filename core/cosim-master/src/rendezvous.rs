//! A reference-counted completion tracker for one asynchronous Execution
//! Manager operation (spec.md §4.6: "a small reference-counted rendezvous
//! object per operation: it holds the callbacks, the countdown, and the
//! worst observed status"). There is no teacher analogue for this exact
//! shape; built directly from the spec text, styled after the reactor's own
//! boxed-`FnMut` callback idiom (`cosim_reactor::Reactor::register_timer`).

use crate::error::ExecutionError;
use cosim_reactor::{Reactor, TimerId};
use std::cell::RefCell;
use std::rc::Rc;

/// One slave's outcome for this operation, threaded through to the
/// per-slave callback before the rendezvous decrements.
pub type SlaveOutcome = Result<(), ExecutionError>;

pub struct Rendezvous {
    pending: usize,
    worst: Option<ExecutionError>,
    on_complete: Option<Box<dyn FnOnce(Result<(), ExecutionError>)>>,
    fired: bool,
    /// The reactor timer guarding this operation's deadline, set once the
    /// caller has registered it (`set_timer`). Cancelled the moment the
    /// rendezvous fires on its own, per spec.md §5: "a completed rendezvous
    /// cancels its timer".
    timer: Option<TimerId>,
}

pub type SharedRendezvous = Rc<RefCell<Rendezvous>>;

impl Rendezvous {
    /// `count` is the number of slaves this operation was issued to; the
    /// aggregate callback fires once every one of them has reported in, or
    /// the operation's timer cancels the remainder with `Timeout`.
    pub fn new(count: usize, on_complete: Box<dyn FnOnce(Result<(), ExecutionError>)>) -> SharedRendezvous {
        let rendezvous = Rendezvous {
            pending: count,
            worst: None,
            on_complete: Some(on_complete),
            fired: false,
            timer: None,
        };
        let shared = Rc::new(RefCell::new(rendezvous));
        if count == 0 {
            Rendezvous::fire(&shared, None);
        }
        shared
    }

    /// Records the `TimerId` of the deadline timer guarding this operation,
    /// so a rendezvous that completes before the deadline can cancel it
    /// instead of leaving it to fire later against slaves that have long
    /// since moved on to other phases.
    pub fn set_timer(shared: &SharedRendezvous, timer: TimerId) {
        shared.borrow_mut().timer = Some(timer);
    }

    /// Records one slave's outcome and, when every slave has reported,
    /// fires the aggregate callback exactly once. This object only tracks
    /// the countdown and the worst status; which slaves are still
    /// outstanding is the caller's concern (`SlaveRecord.phase`, §4.6).
    pub fn decrement(shared: &SharedRendezvous, outcome: SlaveOutcome, reactor: &mut Reactor) {
        {
            let mut rendezvous = shared.borrow_mut();
            if rendezvous.fired {
                return;
            }
            if let Err(err) = outcome {
                if rendezvous.worst.is_none() {
                    rendezvous.worst = Some(err);
                }
            }
            rendezvous.pending = rendezvous.pending.saturating_sub(1);
        }

        if shared.borrow().pending == 0 {
            Rendezvous::fire(shared, Some(reactor));
        }
    }

    fn fire(shared: &SharedRendezvous, reactor: Option<&mut Reactor>) {
        let (callback, timer) = {
            let mut rendezvous = shared.borrow_mut();
            if rendezvous.fired {
                return;
            }
            rendezvous.fired = true;
            (rendezvous.on_complete.take(), rendezvous.timer.take())
        };

        if let (Some(reactor), Some(timer)) = (reactor, timer) {
            reactor.cancel_timer(timer);
        }

        if let Some(callback) = callback {
            let result = shared.borrow().worst.clone().map_or(Ok(()), Err);
            callback(result);
        }
    }

    /// Called when this operation's deadline timer itself fires: any slave
    /// still outstanding is completed with `Timeout`. No cancellation is
    /// needed here — the reactor has already popped this timer off its heap
    /// before invoking the callback that calls `expire`.
    pub fn expire(shared: &SharedRendezvous) {
        let pending = shared.borrow().pending;
        if pending > 0 {
            shared.borrow_mut().worst.get_or_insert(ExecutionError::Timeout(pending));
        }
        Rendezvous::fire(shared, None);
    }

    /// Fires the aggregate callback immediately with `Aborted`, cancelling
    /// this operation's deadline timer (spec.md §8 B4: `Terminate` while a
    /// `Step` is in flight fires that step's rendezvous with `Aborted` and
    /// emits no further callbacks). A no-op if the rendezvous already
    /// fired on its own.
    pub fn abort(shared: &SharedRendezvous, reactor: &mut Reactor) {
        {
            let mut rendezvous = shared.borrow_mut();
            if rendezvous.fired {
                return;
            }
            rendezvous.worst = Some(ExecutionError::Aborted);
        }
        Rendezvous::fire(shared, Some(reactor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn test_reactor() -> Reactor {
        Reactor::new(cosim_support::logging::discard()).expect("reactor binds its wakeup queue")
    }

    #[test]
    fn fires_once_every_slave_reports() {
        let mut reactor = test_reactor();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let rendezvous = Rendezvous::new(
            2,
            Box::new(move |result| {
                assert!(result.is_ok());
                fired_clone.set(true);
            }),
        );

        Rendezvous::decrement(&rendezvous, Ok(()), &mut reactor);
        assert!(!fired.get());
        Rendezvous::decrement(&rendezvous, Ok(()), &mut reactor);
        assert!(fired.get());
    }

    #[test]
    fn worst_status_wins_and_fires_only_once() {
        let mut reactor = test_reactor();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        let rendezvous = Rendezvous::new(
            2,
            Box::new(move |result| {
                *seen_clone.borrow_mut() = Some(result);
            }),
        );

        Rendezvous::decrement(&rendezvous, Err(ExecutionError::Lost), &mut reactor);
        Rendezvous::decrement(&rendezvous, Ok(()), &mut reactor);
        // A third, spurious decrement (e.g. a late timer) must not re-fire.
        Rendezvous::decrement(&rendezvous, Err(ExecutionError::Aborted), &mut reactor);

        assert_eq!(seen.borrow().clone(), Some(Err(ExecutionError::Lost)));
    }

    #[test]
    fn zero_count_fires_immediately() {
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        Rendezvous::new(0, Box::new(move |_| fired_clone.set(true)));
        assert!(fired.get());
    }

    #[test]
    fn completing_before_the_deadline_cancels_the_timer() {
        let mut reactor = test_reactor();
        let rendezvous = Rendezvous::new(1, Box::new(|_| {}));

        let timer_fired = Rc::new(Cell::new(false));
        let timer_fired_clone = timer_fired.clone();
        let timer = reactor.register_timeout(Duration::from_millis(0), move |_reactor| {
            timer_fired_clone.set(true);
        });
        Rendezvous::set_timer(&rendezvous, timer);

        Rendezvous::decrement(&rendezvous, Ok(()), &mut reactor);

        // Give the timer's deadline time to pass, then pump the reactor
        // exactly once: a cancelled timer is popped off the heap and
        // skipped without ever invoking its callback.
        std::thread::sleep(Duration::from_millis(5));
        reactor.run_once();
        assert!(!timer_fired.get(), "timer should have been cancelled when the rendezvous completed early");
    }

    #[test]
    fn abort_fires_with_aborted_and_is_idempotent() {
        let mut reactor = test_reactor();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        let rendezvous = Rendezvous::new(
            1,
            Box::new(move |result| {
                *seen_clone.borrow_mut() = Some(result);
            }),
        );

        Rendezvous::abort(&rendezvous, &mut reactor);
        assert_eq!(seen.borrow().clone(), Some(Err(ExecutionError::Aborted)));

        // A late decrement after abort must not re-fire the callback.
        *seen.borrow_mut() = None;
        Rendezvous::decrement(&rendezvous, Ok(()), &mut reactor);
        assert_eq!(seen.borrow().clone(), None);
    }
}
