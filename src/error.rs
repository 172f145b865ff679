//! Error types for the frontend-driver crate.

use std::path::PathBuf;

/// Errors that can occur while driving the compiler frontend server.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The compiler runtime binary could not be located or is not runnable.
    #[error("compiler tool missing at {path}")]
    ToolMissing { path: PathBuf },

    /// The child process failed to start.
    #[error("failed to spawn compiler frontend server: {0}")]
    SpawnFailed(String),

    /// The compile completed but failed (non-zero exit, or an "absent" frame terminator).
    #[error("compile failed: {0}")]
    CompileFailed(String),

    /// A result line from the child could not be parsed.
    #[error("protocol violation, could not parse line: {0}")]
    ProtocolViolation(String),

    /// The child's stdout closed while a result frame was still pending.
    #[error("compiler frontend server exited unexpectedly mid-frame")]
    UnexpectedExit,

    /// A request was issued in a state that cannot accept it (e.g. an
    /// expression compile before any cold compile has completed).
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// The target model string did not match a known target.
    #[error("unknown target model: {0}")]
    UnknownTargetModel(String),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
