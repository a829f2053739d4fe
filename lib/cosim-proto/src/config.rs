//! Configuration-shaped data carried over the wire and loaded from scenario
//! files. Grounded on `gamecore::config::GameConfig`'s `Default` + `load`
//! idiom; the actual TOML loading (via `serdeconv`) lives in the binaries
//! that own a filesystem (`bin/cosim-master-runner`), not here.

use crate::model::TimePoint;
use serde::{Deserialize, Serialize};

/// The shared options every slave receives in its `SETUP` request
/// (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    pub execution_name: String,
    pub start_time: TimePoint,
    pub stop_time: TimePoint,
    pub variable_recv_timeout_ms: u64,
}

impl Default for ExecutionOptions {
    fn default() -> ExecutionOptions {
        ExecutionOptions {
            execution_name: "execution".to_string(),
            start_time: 0.0,
            stop_time: crate::model::ETERNITY,
            variable_recv_timeout_ms: 1000,
        }
    }
}

/// One slave entry in a `cosim-master-runner` scenario file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveRuntimeConfig {
    pub name: String,
    pub control_endpoint: String,
}

/// A full scenario: the shared options plus the set of slaves to admit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub options: ExecutionOptions,
    pub step_size: f64,
    pub comm_timeout_ms: u64,
    pub slaves: Vec<SlaveRuntimeConfig>,
}
