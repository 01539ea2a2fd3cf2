#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Planning must never panic: parseable patterns plan, the rest
    // error cleanly.
    let _ = idxgrep::query::plan(data);
});
