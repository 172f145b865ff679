//! Fuzz target: `StdoutFramer::feed_line` against arbitrary byte lines.
//!
//! Verifies that no sequence of stdout lines, however malformed, panics the
//! framer or leaves a result frame permanently unresolved.

#![no_main]

use frontend_driver::{InMemorySink, StdoutFramer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else { return };

    let mut framer = StdoutFramer::new();
    let sink = InMemorySink::default();
    let rx = framer.reset(false);

    for line in text.split('\n') {
        framer.feed_line(line, &sink);
    }
    framer.on_eof();

    // on_eof always resolves the pending receiver, however malformed the
    // input was; a fuzz run that leaves this dangling is a bug.
    let _ = rx.try_recv();
});
