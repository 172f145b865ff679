//! Spawning the frontend server child process.
//!
//! Process spawning is an external collaborator boundary: the driver only
//! needs a child that yields an async stdin writer, line-oriented stdout and
//! stderr readers, and a future that resolves to an exit outcome. Modeling it
//! as a trait keeps the session and batch driver testable without a real
//! compiler binary.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::Command;

use crate::error::DriverError;

/// How a child process exited, decoupled from [`std::process::ExitStatus`]
/// so fakes don't need to fork a real process just to report an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited with status code 0.
    Success,
    /// The process exited with a non-zero code, or the code is unknown
    /// (e.g. the process was killed by a signal).
    Failure(Option<i32>),
}

impl ExitOutcome {
    /// Whether the exit outcome represents success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, ExitOutcome::Success)
    }
}

/// A handle to a spawned child, for termination and exit-status collection.
#[async_trait]
pub trait ChildHandle: Send {
    /// Kill the child immediately.
    async fn kill(&mut self) -> std::io::Result<()>;

    /// Wait for the child to exit.
    async fn wait(&mut self) -> std::io::Result<ExitOutcome>;
}

/// The streams and handle for a freshly spawned child.
pub struct SpawnedProcess {
    /// Async writer for the child's stdin.
    pub stdin: Pin<Box<dyn AsyncWrite + Send>>,
    /// Line-buffered reader over the child's stdout.
    pub stdout: Pin<Box<dyn AsyncBufRead + Send>>,
    /// Line-buffered reader over the child's stderr.
    pub stderr: Pin<Box<dyn AsyncBufRead + Send>>,
    /// Handle for killing/awaiting the child.
    pub handle: Box<dyn ChildHandle>,
}

/// Spawns a child process given a binary path and argument list.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawn `binary` with `args`, piping all three standard streams.
    ///
    /// # Errors
    /// Returns [`DriverError::SpawnFailed`] if the process cannot be started.
    async fn spawn(&self, binary: &Path, args: &[String]) -> Result<SpawnedProcess, DriverError>;
}

/// A [`ProcessSpawner`] backed by `tokio::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessSpawner;

struct TokioChildHandle(tokio::process::Child);

#[async_trait]
impl ChildHandle for TokioChildHandle {
    async fn kill(&mut self) -> std::io::Result<()> {
        self.0.kill().await
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        let status = self.0.wait().await?;
        Ok(if status.success() { ExitOutcome::Success } else { ExitOutcome::Failure(status.code()) })
    }
}

#[async_trait]
impl ProcessSpawner for TokioProcessSpawner {
    async fn spawn(&self, binary: &Path, args: &[String]) -> Result<SpawnedProcess, DriverError> {
        let mut child = Command::new(binary)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::SpawnFailed(format!("exec {}: {e}", binary.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::SpawnFailed("child stdin not piped".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::SpawnFailed("child stdout not piped".to_owned()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::SpawnFailed("child stderr not piped".to_owned()))?;

        Ok(SpawnedProcess {
            stdin: Box::pin(stdin),
            stdout: Box::pin(BufReader::new(stdout)),
            stderr: Box::pin(BufReader::new(stderr)),
            handle: Box::new(TokioChildHandle(child)),
        })
    }
}
