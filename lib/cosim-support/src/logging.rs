//! Structured logging, wired the way `flux::logging` was meant to be: a thin
//! re-export of `slog`'s macros plus a couple of ready-made `Logger`
//! constructors so every binary in the workspace logs the same way.

pub use slog::Logger;
pub use slog::{crit, debug, error, info, o, trace, warn};
pub use slog::Discard;

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds a terminal logger at the given severity. Used by every `bin/`
/// entry point; matches the `type = "terminal"` config the teacher's
/// `flux::logging::init` hard-coded, except this one actually returns a
/// working `Logger` instead of discarding it.
pub fn init_terminal(level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);
    builder
        .build()
        .expect("terminal logger configuration is always valid")
}

/// A logger that discards everything. Used as the default for components
/// constructed without an explicit parent logger (tests, and any call site
/// following the `World::new`-style `Into<Option<&Logger>>` pattern).
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}
