//! Slave Agent (spec.md §4.5): the process that wraps one `cosim_model::Instance`
//! and speaks the control/data-plane protocols to a master. `core` holds the
//! state machine and can be driven synchronously in tests; `network` wires it
//! to real sockets on a `cosim_reactor::Reactor`.

pub mod core;
pub mod error;
pub mod network;
pub mod phase;
pub mod varbus;

pub use crate::core::{SlaveAgentCore, StepOutcome, SubscriptionEffect};
pub use error::AgentError;
pub use network::SlaveAgent;
pub use phase::SlavePhase;
