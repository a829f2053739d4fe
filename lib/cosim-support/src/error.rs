/// Mirrors `flux::shared::ErrorUtils`: lets call sites treat a "would
/// block"-shaped result the same way across every crate's own error enum,
/// without forcing a single workspace-wide error type.
pub trait ErrorUtils {
    /// True for any outcome that is not success and not a benign
    /// would-block/retry signal.
    fn has_failed(&self) -> bool;
}

/// A result's "would block, try again later" case, distinguished from a
/// hard failure. Per-crate error enums (`WireError`, `AgentError`, ...)
/// implement `Into<WouldBlock>`-style checks by matching on their own
/// variants; this marker trait documents the shared vocabulary.
pub trait WouldBlock {
    fn is_would_block(&self) -> bool;
}
