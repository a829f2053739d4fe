/// Error kinds from spec.md §7, one variant per kind rather than the
/// teacher's single flat `NetworkError` — the execution-coordination error
/// surface is wider than one connection's read/write failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("{0}")]
    InputError(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("timed out waiting for {0} peer(s)")]
    Timeout(usize),

    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("slave lost")]
    Lost,

    #[error("aborted")]
    Aborted,
}
