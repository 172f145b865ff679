//! Fake [`ProcessSpawner`] for exercising the session/batch-driver state
//! machines without a real compiler binary.
//!
//! A fake backend behind the real trait, in the vein of an always-fail VM
//! backend used to exercise orchestrator error paths: the fake here hands
//! the test a controller it can use to read whatever the driver wrote to
//! "stdin", push lines onto "stdout"/"stderr", and decide how the child
//! exits.

#![cfg(any(test, feature = "test-util"))]

use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::error::DriverError;
use crate::process::{ChildHandle, ExitOutcome, ProcessSpawner, SpawnedProcess};

/// The test-facing half of a fake child process.
pub struct FakeChildController {
    /// Readable end of the pipe the driver writes its stdin commands into.
    /// Buffered so repeated [`read_line`] calls share read state.
    pub stdin_reader: BufReader<tokio::io::DuplexStream>,
    /// Writable end of the pipe the driver reads as the child's stdout.
    pub stdout_writer: tokio::io::DuplexStream,
    /// Writable end of the pipe the driver reads as the child's stderr.
    pub stderr_writer: tokio::io::DuplexStream,
    /// Fires the child's exit outcome once sent.
    pub exit_tx: Option<oneshot::Sender<ExitOutcome>>,
    /// Set by [`ChildHandle::kill`] once the driver kills this child.
    pub killed: Arc<AtomicBool>,
    /// The binary path the driver spawned, for assertions.
    pub binary: std::path::PathBuf,
    /// The argument list the driver spawned with, for assertions.
    pub args: Vec<String>,
}

/// A [`ProcessSpawner`] that hands every spawned child's controller to the
/// test over an unbounded channel.
pub struct FakeSpawner {
    tx: mpsc::UnboundedSender<FakeChildController>,
}

impl FakeSpawner {
    /// Create a fake spawner and the receiver the test drains controllers from.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeChildController>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

struct FakeChildHandle {
    exit_rx: Option<oneshot::Receiver<ExitOutcome>>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl ChildHandle for FakeChildHandle {
    async fn kill(&mut self) -> std::io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        match self.exit_rx.take() {
            Some(rx) => Ok(rx.await.unwrap_or(ExitOutcome::Failure(None))),
            None => Ok(ExitOutcome::Failure(None)),
        }
    }
}

#[async_trait]
impl ProcessSpawner for FakeSpawner {
    async fn spawn(&self, binary: &Path, args: &[String]) -> Result<SpawnedProcess, DriverError> {
        let (stdin_for_driver, stdin_reader) = tokio::io::duplex(1 << 16);
        let (stdout_for_driver, stdout_writer) = tokio::io::duplex(1 << 16);
        let (stderr_for_driver, stderr_writer) = tokio::io::duplex(1 << 16);
        let (exit_tx, exit_rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));

        let controller = FakeChildController {
            stdin_reader: BufReader::new(stdin_reader),
            stdout_writer,
            stderr_writer,
            exit_tx: Some(exit_tx),
            killed: killed.clone(),
            binary: binary.to_owned(),
            args: args.to_vec(),
        };
        let _ = self.tx.send(controller);

        Ok(SpawnedProcess {
            stdin: Box::pin(stdin_for_driver) as Pin<Box<dyn AsyncWrite + Send>>,
            stdout: Box::pin(BufReader::new(stdout_for_driver)) as Pin<Box<dyn AsyncBufRead + Send>>,
            stderr: Box::pin(BufReader::new(stderr_for_driver)) as Pin<Box<dyn AsyncBufRead + Send>>,
            handle: Box::new(FakeChildHandle { exit_rx: Some(exit_rx), killed }),
        })
    }
}

/// Read one line at a time from a buffered reader, convenience wrapper over
/// `AsyncBufReadExt::read_line` that trims the trailing newline and reports
/// EOF as `None`.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<String> {
    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.ok()?;
    if n == 0 {
        return None;
    }
    if line.ends_with('\n') {
        line.pop();
    }
    Some(line)
}

/// Write a line (with trailing `\n`) to the controller's stdout/stderr
/// writer end.
pub async fn write_line(writer: &mut tokio::io::DuplexStream, line: &str) {
    use tokio::io::AsyncWriteExt;
    let _ = writer.write_all(format!("{line}\n").as_bytes()).await;
}
