//! Execution Manager (spec.md §4.6): the master-side coordinator that
//! admits slaves, wires their variables together, and drives the fixed-step
//! simulation loop. `manager` holds the state machine and can be driven and
//! tested synchronously; `network` wires it to real sockets on a
//! `cosim_reactor::Reactor`, mirroring the split `cosim_slave` makes between
//! `core` and `network`.

pub mod error;
pub mod manager;
pub mod network;
pub mod record;
pub mod rendezvous;

pub use error::ExecutionError;
pub use manager::{ExecutionManagerCore, ExecutionPhase};
pub use network::ExecutionManager;
pub use record::{RecordPhase, SlaveRecord};
pub use rendezvous::{Rendezvous, SharedRendezvous};
