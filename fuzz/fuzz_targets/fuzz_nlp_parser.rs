#![no_main]

use libfuzzer_sys::fuzz_target;
use npm_core::parser::parse_nlp_file;

// The NLP grammar is adversarial by construction: it's whatever text a
// firmware vendor's hardware-description file happens to contain. Every
// line shape is gated by a regex before any further parsing, so malformed
// input should always come back as an error, never a panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(source) = core::str::from_utf8(data) {
        let _ = parse_nlp_file(source);
    }
});
