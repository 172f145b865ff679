//! Diagnostic routing: where non-result compiler output goes.

use std::sync::Mutex;

/// Visual weight for a diagnostic line, so a terminal-backed sink can color
/// or bold the one-time "Compiler message:" header distinctly from the
/// lines that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    /// An ordinary diagnostic line.
    Plain,
    /// A one-time banner introducing a run of diagnostics.
    Header,
}

/// Accepts diagnostic lines forwarded from the compiler's stdout (non-result
/// lines) and stderr (forwarded unfiltered).
pub trait DiagnosticSink: Send + Sync {
    /// Emit one line.
    fn emit(&self, emphasis: Emphasis, line: &str);
}

/// Forwards every line to `tracing` at `info` level, with emphasis preserved
/// as a structured field rather than ANSI escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, emphasis: Emphasis, line: &str) {
        match emphasis {
            Emphasis::Header => tracing::info!(header = true, "{line}"),
            Emphasis::Plain => tracing::info!(header = false, "{line}"),
        }
    }
}

/// Collects every emitted line in memory. Used by tests and by callers that
/// want to inspect compiler diagnostics programmatically.
#[derive(Debug, Default)]
pub struct InMemorySink {
    lines: Mutex<Vec<String>>,
}

impl InMemorySink {
    /// Snapshot of every line emitted so far, in emission order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl DiagnosticSink for InMemorySink {
    fn emit(&self, _emphasis: Emphasis, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_owned());
        }
    }
}
