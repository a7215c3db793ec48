//! Error taxonomy for the simulator core and its command layer.

use thiserror::Error;

/// Errors raised while loading a listing file, a snapshot file, or while
/// running the machine itself.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("io error reading {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("malformed listing line {line_no}: {line}")]
    BadListingLine { line_no: usize, line: String },

    #[error("malformed snapshot: {0}")]
    BadSnapshot(String),

    #[error("PC points to undefined instruction, exiting...")]
    UndefinedInstruction(u16),

    #[error("unknown label {0:?}")]
    UnknownLabel(String),
}

/// Errors raised while parsing or executing one REPL command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command: {0:?}")]
    Unrecognized(String),

    #[error("{0}")]
    BadArgument(String),

    #[error(transparent)]
    Sim(#[from] SimError),
}
