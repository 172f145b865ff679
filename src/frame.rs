//! Parses the frontend server's stdout into result frames.

use tokio::sync::oneshot;

use crate::diagnostics::{DiagnosticSink, Emphasis};
use crate::error::DriverError;

/// The result of a single compile, recompile, or expression-compile command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOutput {
    /// Path to the emitted kernel file, if the compile produced one.
    pub output_file: Option<String>,
    /// Number of errors reported for this compile.
    pub error_count: u32,
}

/// Consumes a line stream from the child's stdout and resolves one
/// [`CompilerOutput`] per result frame.
///
/// A `StdoutFramer` is single-use per frame: call [`StdoutFramer::reset`]
/// before writing each new command so the next result lands on a fresh
/// completion.
pub struct StdoutFramer {
    boundary_key: Option<String>,
    seen_diagnostic: bool,
    suppress_diagnostics: bool,
    pending: Option<oneshot::Sender<CompilerOutput>>,
    result_rx: Option<oneshot::Receiver<CompilerOutput>>,
}

impl Default for StdoutFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutFramer {
    /// Create a framer with no pending result. Call [`StdoutFramer::reset`]
    /// before issuing the first command.
    #[must_use]
    pub fn new() -> Self {
        Self {
            boundary_key: None,
            seen_diagnostic: false,
            suppress_diagnostics: false,
            pending: None,
            result_rx: None,
        }
    }

    /// Arm the framer for the next command: clears the boundary key and
    /// diagnostic-seen flag, and returns a receiver that resolves once the
    /// next result frame completes.
    ///
    /// `suppress_diagnostics` drops intervening diagnostic lines instead of
    /// forwarding them (used for expression compilation).
    pub fn reset(&mut self, suppress_diagnostics: bool) -> oneshot::Receiver<CompilerOutput> {
        let (tx, rx) = oneshot::channel();
        self.boundary_key = None;
        self.seen_diagnostic = false;
        self.suppress_diagnostics = suppress_diagnostics;
        self.pending = Some(tx);
        rx
    }

    /// Feed one line of stdout into the framer, forwarding diagnostics to
    /// `sink` and completing the pending result when a frame ends.
    pub fn feed_line(&mut self, line: &str, sink: &dyn DiagnosticSink) {
        if self.boundary_key.is_none() {
            if let Some(key) = line.strip_prefix("result ") {
                self.boundary_key = Some(key.to_owned());
            } else {
                self.route_diagnostic(line, sink);
            }
            return;
        }

        let key = self.boundary_key.clone().unwrap_or_default();
        if let Some(rest) = line.strip_prefix(key.as_str()) {
            if rest.is_empty() {
                self.complete(CompilerOutput { output_file: None, error_count: 0 });
                return;
            }
            self.complete_from_suffix(rest, sink);
            return;
        }

        self.route_diagnostic(line, sink);
    }

    /// Called when the child's stdout reaches EOF. If a result was still
    /// pending, it resolves to "absent" so no caller hangs forever.
    pub fn on_eof(&mut self) {
        self.complete(CompilerOutput { output_file: None, error_count: 0 });
    }

    fn complete_from_suffix(&mut self, suffix: &str, sink: &dyn DiagnosticSink) {
        // Suffix form is " <outputPath> <errorCount>"; split at the *last* space.
        let trimmed = match suffix.strip_prefix(' ') {
            Some(t) => t,
            None => {
                // Not a well-formed terminator suffix; treat the whole line as a diagnostic.
                self.route_diagnostic(suffix, sink);
                return;
            }
        };

        match trimmed.rfind(' ') {
            Some(idx) => {
                let (path, count_str) = (&trimmed[..idx], &trimmed[idx + 1..]);
                match count_str.trim().parse::<u32>() {
                    Ok(count) => self.complete(CompilerOutput {
                        output_file: Some(path.to_owned()),
                        error_count: count,
                    }),
                    Err(_) => self.report_protocol_violation(trimmed, sink),
                }
            }
            None => self.report_protocol_violation(trimmed, sink),
        }
    }

    /// Logs an unparsable result line as a [`DriverError::ProtocolViolation`]
    /// and degrades the pending result to "absent" rather than propagating
    /// the error: a malformed line from the child is not something the
    /// caller can act on, only something an operator should see.
    fn report_protocol_violation(&mut self, line: &str, sink: &dyn DiagnosticSink) {
        let violation = DriverError::ProtocolViolation(line.to_owned());
        tracing::warn!(error = %violation, "protocol violation parsing result frame");
        sink.emit(Emphasis::Plain, &format!("malformed result line: {line}"));
        self.complete(CompilerOutput { output_file: None, error_count: 0 });
    }

    fn route_diagnostic(&mut self, line: &str, sink: &dyn DiagnosticSink) {
        if self.suppress_diagnostics {
            return;
        }
        if !self.seen_diagnostic {
            sink.emit(Emphasis::Header, "Compiler message:");
            self.seen_diagnostic = true;
        }
        sink.emit(Emphasis::Plain, line);
    }

    fn complete(&mut self, output: CompilerOutput) {
        if let Some(tx) = self.pending.take() {
            let _ = tx.send(output);
        }
    }
}
