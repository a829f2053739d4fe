use crate::Reactor;
use std::sync::mpsc::Sender;

type PostedJob = Box<dyn FnOnce(&mut Reactor) + Send>;

/// Lets a helper thread post a completion back onto the reactor thread
/// without the reactor ever blocking on anything but its own poll set
/// (spec.md §5: "every external operation returns immediately ... the
/// variable-barrier ... is implemented by pumping the reactor ... never by
/// blocking the reactor thread on a socket read alone").
#[derive(Clone)]
pub struct Handle {
    sender: Sender<PostedJob>,
    set_readiness: mio::SetReadiness,
}

impl Handle {
    pub(crate) fn new(sender: Sender<PostedJob>, set_readiness: mio::SetReadiness) -> Handle {
        Handle { sender, set_readiness }
    }

    /// Enqueues `job` to run on the reactor thread and wakes the poll.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce(&mut Reactor) + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_ok() {
            let _ = self.set_readiness.set_readiness(mio::Ready::readable());
        }
    }
}
