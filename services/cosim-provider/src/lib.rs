//! The slave-provider directory service (spec.md §4.7, supplemented from
//! `original_source`'s domain protocol): a process that advertises the
//! slave types it can spawn and instantiates new slave agents on request.
//! `core` holds the directory and spawn logic and can be driven and tested
//! synchronously; `network` wires it to a real listener on a
//! `cosim_reactor::Reactor`, mirroring the split `cosim_slave` makes
//! between `core` and `network`.

pub mod core;
pub mod network;

pub use core::{ProviderConfig, ProviderCore, SlaveTypeEntry};
pub use network::ProviderAgent;
