//! Fuzz target: `path_to_file_uri` / `file_uri_to_path` / `URIMapper::map`
//! against arbitrary path strings.
//!
//! These are pure string transforms with no filesystem access, so any input
//! that panics or produces a URI `file_uri_to_path` can't parse back is a
//! real bug, not an environment artifact.

#![no_main]

use frontend_driver::file_uri::{file_uri_to_path, path_to_file_uri};
use frontend_driver::URIMapper;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(path) = std::str::from_utf8(data) else { return };

    let uri = path_to_file_uri(path);
    assert!(uri.starts_with("file://"), "path_to_file_uri must always emit a file: URI");

    // Decoding a URI this function itself produced must never panic, even
    // if it doesn't losslessly invert (backslashes are normalized away).
    let _ = file_uri_to_path(&uri);

    // An empty mapper never maps anything; feeding it arbitrary paths must
    // not panic regardless of how strange the path looks.
    let mapper = URIMapper::empty();
    assert_eq!(mapper.map(path), None);
});
